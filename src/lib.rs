//! Cross-thread call-tree performance instrumentation.
//!
//! A [`Scope`] brackets a region of code; its destructor folds the
//! interval it measured into a node of the calling thread's call tree,
//! keyed by a stable identity derived from the call site and its nesting
//! path (§4.4). Repeated visits to the same site accumulate onto the same
//! node ("laps") instead of growing the tree. [`finalize`] merges every
//! thread's tree into one and writes a text report plus a JSON archive.
//!
//! ```no_run
//! use perf_instrument::{default_components, scope_begin, finalize};
//!
//! fn work() {
//!     let _scope = scope_begin("work", line!(), "cxx", false, default_components());
//!     // ... region to measure ...
//! }
//!
//! work();
//! finalize("perf").unwrap();
//! ```

mod bundle;
mod component;
mod error;
mod identity;
mod manager;
mod report;
mod scope;
mod settings;
mod storage;

pub use bundle::Bundle;
pub use component::{
    Capabilities, Component, CpuClock, CpuUtilization, DerivationInputs, PeakMemory, SystemClock,
    UserClock, WallClock,
};
pub use error::{Error, Result};
pub use identity::Identity;
pub use manager::Manager;
pub use scope::Scope;
pub use settings::Settings;

/// Enter a bracketed region. Equivalent to the source library's
/// `scope_begin`/`scope_end` pair — in Rust, `scope_end` is implicit: the
/// region closes when the returned [`Scope`] is dropped (`spec.md` §6).
pub fn scope_begin(
    key: impl Into<String>,
    line: u32,
    tag: impl Into<String>,
    report_on_exit: bool,
    components: Vec<Box<dyn Component>>,
) -> Scope {
    Scope::new(key, line, tag, report_on_exit, components)
}

/// The standard component set: wall, CPU, user and system clocks, plus
/// derived CPU utilization. [`record_memory`] additionally folds a peak
/// resident-set-size gauge into bundles built from this list.
pub fn default_components() -> Vec<Box<dyn Component>> {
    let mut components: Vec<Box<dyn Component>> = vec![
        Box::new(WallClock::new()),
        Box::new(CpuClock::new()),
        Box::new(UserClock::new()),
        Box::new(SystemClock::new()),
        Box::new(CpuUtilization::new()),
    ];
    if Manager::global().should_record_memory() {
        components.push(Box::new(PeakMemory::new()));
    }
    components
}

pub fn set_enabled(enabled: bool) {
    Manager::global().set_enabled(enabled);
}

pub fn is_enabled() -> bool {
    Manager::global().is_enabled()
}

pub fn set_max_depth(depth: u32) {
    Manager::global().set_max_depth(depth);
}

pub fn get_max_depth() -> u32 {
    Manager::global().max_depth()
}

/// Toggle memory-component participation in [`default_components`].
/// Takes effect for scopes opened after this call; scopes already open
/// keep whatever bundle they started with.
pub fn record_memory(enabled: bool) {
    Manager::global().set_record_memory(enabled);
}

/// Rank-prefix every report line with `rank` (`SPEC_FULL.md` §3 — the
/// MPI-style multi-process complement to thread identity). `None` omits
/// the prefix.
pub fn set_rank_prefix(rank: Option<u32>) {
    Manager::global().set_rank_prefix(rank);
}

/// Merge every thread's call tree and write `<output_basename>.out` /
/// `.json` under [`Settings::output_path`] (`spec.md` §6).
pub fn finalize(output_basename: impl AsRef<std::path::Path>) -> Result<()> {
    Manager::global().finalize(output_basename)
}
