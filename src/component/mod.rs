//! The component contract (`spec.md` §4.1): the uniform set of operations
//! every measurement kind must support so a [`crate::bundle::Bundle`] can
//! broadcast `start`/`stop`/`record`/arithmetic/serialize/print across a
//! heterogeneous set of them without knowing their concrete types.
//!
//! Concrete kinds are collaborators, not the hard engineering core this
//! crate is about (`spec.md` §1) — the ones shipped here (wall clock, cpu
//! clock, user/system time, cpu utilization, memory) are small, real
//! implementations that exist to make the contract exercisable and
//! testable, not a generalized measurement backend.

use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

mod cpu_clock;
mod cpu_util;
mod memory;
mod rusage;
mod system_clock;
mod user_clock;
mod wall_clock;

pub use cpu_clock::CpuClock;
pub use cpu_util::CpuUtilization;
pub use memory::PeakMemory;
pub use system_clock::SystemClock;
pub use user_clock::UserClock;
pub use wall_clock::WallClock;

/// A `kind -> base-unit value` map gathered from every sibling in a bundle,
/// consulted by [`Component::apply_derivation`] at report time.
pub type DerivationInputs = HashMap<&'static str, f64>;

/// Compile-time/registration-time capability flags (`spec.md` §4.1).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub thread_scope_only: bool,
    pub is_timing_category: bool,
    pub uses_timing_units: bool,
    pub uses_percent_units: bool,
    pub supports_flamegraph: bool,
}

/// A single measurable metric, owned by exactly one bundle at a time.
///
/// Implementors carry a current sample and an accumulator; the default
/// method bodies make every hook optional except the handful that give a
/// component meaning (`start`/`stop`/`record`/`reset`/the three arithmetic
/// operations/`serialize_into`/`print`).
pub trait Component: Any + fmt::Debug + Send {
    /// Stable name used as both the derivation key and the archive's
    /// per-component sub-object key.
    fn kind(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Whether this component could probe its underlying measurement
    /// source. An unavailable component degrades to a zero-state no-op
    /// (`spec.md` §7 kind 1) rather than failing bundle construction.
    fn is_available(&self) -> bool {
        true
    }

    /// Capture a starting sample. Callers guarantee balanced start/stop;
    /// idempotence on an already-started component is not required.
    fn start(&mut self);

    /// Capture an ending sample and fold `(end - start)` into the
    /// accumulator.
    fn stop(&mut self);

    /// Start iff not already started. Returns whether a transition
    /// occurred, so the bundle can adjust its lap counter.
    fn conditional_start(&mut self) -> bool;

    /// Stop iff already started. Returns whether a transition occurred.
    fn conditional_stop(&mut self) -> bool;

    /// Take a single non-interval sample (gauges such as memory
    /// high-water).
    fn record(&mut self);

    /// Zero the accumulator and internal counters. Display metadata is
    /// untouched.
    fn reset(&mut self);

    /// Pairwise accumulator combination with another same-kind component.
    /// `other` is never mutated. Implementations downcast via
    /// [`Component::as_any`] and are a no-op on a kind mismatch (which
    /// should never happen — bundles only combine same-shaped templates).
    fn add_assign(&mut self, other: &dyn Component);

    /// Pairwise accumulator subtraction, same contract as
    /// [`Component::add_assign`].
    fn sub_assign(&mut self, other: &dyn Component);

    /// Scalar scaling of the accumulator (`*=`/`/=` depending on sign of
    /// the exponent implied by the caller — callers pass `1.0 / n` for
    /// division).
    fn scale(&mut self, factor: f64);

    /// Emit accumulator and metadata into the archive's per-component
    /// sub-object.
    fn serialize_into(&self, map: &mut Map<String, Value>);

    /// Restore the accumulator from a sub-object previously emitted by
    /// [`Component::serialize_into`] (`spec.md` §8 round-trip law). The
    /// default is a no-op, appropriate for kinds with nothing meaningful to
    /// reconstruct.
    fn deserialize_from(&mut self, _map: &Map<String, Value>) {}

    /// Append a human-readable form. `index`/`total` let implementations
    /// place delimiters between siblings.
    fn print(&self, f: &mut dyn fmt::Write, index: usize, total: usize) -> fmt::Result;

    fn clone_box(&self) -> Box<dyn Component>;

    fn as_any(&self) -> &dyn Any;

    /// Ranked list of derivation options: each inner slice names the
    /// sibling kinds this component needs, in preference order. The bundle
    /// applies the first option whose inputs are all present.
    fn derivations(&self) -> &'static [&'static [&'static str]] {
        &[]
    }

    /// Recompute this component's accumulator from sibling values, using
    /// the derivation option the bundle selected.
    fn apply_derivation(&mut self, _inputs: &DerivationInputs) {}

    /// This component's accumulated value in its declared base unit, used
    /// to populate [`DerivationInputs`] for siblings that derive from it.
    /// `None` for components that don't participate in derivation (most
    /// of them).
    fn primary_value(&self) -> Option<f64> {
        None
    }

    /// Global (process-wide) init hook, invoked by the manager exactly once
    /// per kind, on first observation of this kind in any thread.
    /// `directive` is the `AUTO_LIST_INIT` configuration value, forwarded
    /// verbatim (`spec.md` §6).
    fn ensure_global_init(&self, _directive: &str) {}

    /// Per-thread init hook, invoked by the manager exactly once per kind,
    /// per thread, on first observation of this kind in the current
    /// thread. Same `directive` as [`Component::ensure_global_init`].
    fn ensure_thread_init(&mut self, _directive: &str) {}
}

impl Clone for Box<dyn Component> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
