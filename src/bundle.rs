//! The component bundle (`spec.md` §4.2): an ordered, heterogeneous
//! collection of [`Component`]s that broadcasts every operation across its
//! members and tracks a lap counter alongside a stable identity.
//!
//! Rust has no variadic generics, so unlike the C++ `component_tuple<Types...>`
//! this spec is modeled on, `Bundle` is a `Vec<Box<dyn Component>>`
//! (design note §9, option (b)) — generalized from the teacher's
//! `CounterGroup` (a fixed leader+siblings pair broadcasting `enable`/
//! `disable`/`clear_count` as one unit) to an open-ended, heterogeneous
//! collection. The operation set stays closed (this file), component kinds
//! stay open (`component/mod.rs`).

use crate::component::{Component, DerivationInputs};
use crate::error::Error;
use crate::identity::Identity;
use serde_json::{Map, Value};
use std::fmt;

/// A fixed-arity, type-heterogeneous collection of measurement components,
/// identified by a single 64-bit hash and tracked by a lap counter.
pub struct Bundle {
    components: Vec<Box<dyn Component>>,
    laps: u64,
    identity: Identity,
    depth: u32,
    key: String,
    tag: String,
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("key", &self.key)
            .field("tag", &self.tag)
            .field("depth", &self.depth)
            .field("identity", &self.identity)
            .field("laps", &self.laps)
            .field("components", &self.components.len())
            .finish()
    }
}

impl Clone for Bundle {
    fn clone(&self) -> Self {
        Bundle {
            components: self.components.iter().map(|c| c.clone_box()).collect(),
            laps: self.laps,
            identity: self.identity,
            depth: self.depth,
            key: self.key.clone(),
            tag: self.tag.clone(),
        }
    }
}

impl Bundle {
    /// Construct a bundle whose identity was already computed by the
    /// caller (`spec.md` §4.4 — identity is computed once, on scope entry,
    /// before any measurement; the bundle never recomputes it).
    pub fn new(
        key: impl Into<String>,
        tag: impl Into<String>,
        depth: u32,
        identity: Identity,
        components: Vec<Box<dyn Component>>,
    ) -> Self {
        for c in &components {
            if !c.is_available() {
                log::warn!("{}", Error::ComponentUnavailable { kind: c.kind() });
            }
        }
        Bundle {
            components,
            laps: 0,
            identity,
            depth,
            key: key.into(),
            tag: tag.into(),
        }
    }

    /// A bundle with the same shape (kinds, in order) as `template`, zeroed.
    /// Used by storage when it needs to create a fresh node accumulator.
    pub fn zeroed_like(template: &Bundle, identity: Identity, depth: u32) -> Self {
        let components = template
            .components
            .iter()
            .map(|c| {
                let mut fresh = c.clone_box();
                fresh.reset();
                fresh
            })
            .collect();
        Bundle::new(template.key.clone(), template.tag.clone(), depth, identity, components)
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn laps(&self) -> u64 {
        self.laps
    }

    pub fn components(&self) -> &[Box<dyn Component>] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Forward `start` to every available component, then `laps += 1`. An
    /// unavailable component degrades to a no-op (`spec.md` §7 kind 1).
    pub fn start(&mut self) {
        for c in &mut self.components {
            if c.is_available() {
                c.start();
            }
        }
        self.laps += 1;
    }

    /// Forward `stop` to every available component. Laps are unaffected.
    pub fn stop(&mut self) {
        for c in &mut self.components {
            if c.is_available() {
                c.stop();
            }
        }
    }

    /// Forward `conditional_start` to every available component; `laps += 1`
    /// iff any of them transitioned.
    pub fn conditional_start(&mut self) {
        let mut transitioned = false;
        for c in &mut self.components {
            if c.is_available() && c.conditional_start() {
                transitioned = true;
            }
        }
        if transitioned {
            self.laps += 1;
        }
    }

    /// Forward `conditional_stop` to every available component; `laps -= 1`
    /// iff any of them transitioned (used by [`Bundle::resume`]'s inverse,
    /// [`Bundle::pause`]).
    pub fn conditional_stop(&mut self) {
        let mut transitioned = false;
        for c in &mut self.components {
            if c.is_available() && c.conditional_stop() {
                transitioned = true;
            }
        }
        if transitioned {
            self.laps = self.laps.saturating_sub(1);
        }
    }

    /// True pause semantics (`SPEC_FULL.md` §3): stop-if-running, the
    /// inverse lap bookkeeping of `conditional_start` because it brackets a
    /// sub-interval of an already-open lap rather than opening a new one.
    pub fn pause(&mut self) {
        let mut transitioned = false;
        for c in &mut self.components {
            if c.is_available() && c.conditional_stop() {
                transitioned = true;
            }
        }
        if transitioned {
            self.laps = self.laps.saturating_sub(1);
        }
    }

    /// Resume after [`Bundle::pause`]: start-if-not-running.
    pub fn resume(&mut self) {
        let mut transitioned = false;
        for c in &mut self.components {
            if c.is_available() && c.conditional_start() {
                transitioned = true;
            }
        }
        if transitioned {
            self.laps += 1;
        }
    }

    /// Take a single non-interval sample on every available component.
    /// Laps are unaffected, matching [`Bundle::measure`] (`spec.md` §4.2
    /// table — `record`/`reset`/`measure` only differ on laps in that
    /// `reset` zeros them).
    pub fn record(&mut self) {
        for c in &mut self.components {
            if c.is_available() {
                c.record();
            }
        }
    }

    /// Same as [`Bundle::record`] — mirrors the source's distinct
    /// `measure()` operation (`spec.md` §4.2 table).
    pub fn measure(&mut self) {
        for c in &mut self.components {
            if c.is_available() {
                c.record();
            }
        }
    }

    /// `record()` against a read-only baseline: sample, then subtract the
    /// baseline's values pairwise. `baseline` is never mutated (`spec.md`
    /// §9 — `record(rhs)` is treated as pure and non-mutating on `rhs`,
    /// resolving the ambiguity in the original source).
    pub fn record_from(&mut self, baseline: &Bundle) {
        for c in &mut self.components {
            if c.is_available() {
                c.record();
            }
        }
        if !std::ptr::eq(self, baseline) {
            self.laps += 1;
        }
        for (mine, theirs) in self.components.iter_mut().zip(baseline.components.iter()) {
            mine.sub_assign(theirs.as_ref());
        }
    }

    /// Zero every component's accumulator and `laps`. Display metadata
    /// (key/tag/identity/depth) is untouched.
    pub fn reset(&mut self) {
        for c in &mut self.components {
            c.reset();
        }
        self.laps = 0;
    }

    /// `+=`: pairwise accumulator combination, `laps += rhs.laps`.
    pub fn add_assign(&mut self, rhs: &Bundle) {
        for (mine, theirs) in self.components.iter_mut().zip(rhs.components.iter()) {
            mine.add_assign(theirs.as_ref());
        }
        self.laps += rhs.laps;
    }

    /// `-=`: pairwise accumulator combination, `laps -= rhs.laps`.
    pub fn sub_assign(&mut self, rhs: &Bundle) {
        for (mine, theirs) in self.components.iter_mut().zip(rhs.components.iter()) {
            mine.sub_assign(theirs.as_ref());
        }
        self.laps = self.laps.saturating_sub(rhs.laps);
    }

    /// Scalar `*=`/`/=` (pass `1.0 / n` for division). `laps` is unaffected.
    pub fn scale(&mut self, factor: f64) {
        for c in &mut self.components {
            c.scale(factor);
        }
    }

    /// Recompute every derived component's accumulator from its siblings'
    /// current values (`spec.md` §4.1 "Derivation" — applied at report
    /// time, never sampled). Idempotent: call before every print/serialize.
    pub fn derive(&mut self) {
        let mut inputs = DerivationInputs::new();
        for c in &self.components {
            if let Some(v) = c.primary_value() {
                inputs.insert(c.kind(), v);
            }
        }
        for c in &mut self.components {
            for option in c.derivations() {
                if option.iter().all(|needed| inputs.contains_key(needed)) {
                    c.apply_derivation(&inputs);
                    break;
                }
            }
        }
    }

    /// Emit `{"identifier", "laps", "data": {kind: {...}, ...}}`. `data`
    /// preserves the bundle's static component order (`spec.md` §4.7). A
    /// component that reported itself unavailable is omitted rather than
    /// emitted as a zero-state entry (`spec.md` §7 kind 1 — "reported as
    /// absent in archive").
    pub fn serialize(&self) -> Value {
        let mut data = Map::new();
        for c in &self.components {
            if !c.is_available() {
                continue;
            }
            let mut entry = Map::new();
            c.serialize_into(&mut entry);
            data.insert(c.kind().to_string(), Value::Object(entry));
        }
        let mut obj = Map::new();
        obj.insert("identifier".into(), Value::from(self.identity.to_string()));
        obj.insert("laps".into(), Value::from(self.laps));
        obj.insert("data".into(), Value::Object(data));
        Value::Object(obj)
    }

    /// Restore `identity`, `laps`, and every component's accumulator from a
    /// value produced by [`Bundle::serialize`] (`spec.md` §8 round-trip
    /// law: `serialize(deserialize(x)) == x`). `self`'s component list must
    /// already have the same kinds, in the same order, as the bundle that
    /// produced `value` — typically a bundle built via [`Bundle::zeroed_like`]
    /// against the original template.
    pub fn deserialize_from(&mut self, value: &Value) {
        let Some(obj) = value.as_object() else {
            return;
        };
        if let Some(Value::String(id)) = obj.get("identifier") {
            if let Some(identity) = Identity::parse(id) {
                self.identity = identity;
            }
        }
        if let Some(laps) = obj.get("laps").and_then(Value::as_u64) {
            self.laps = laps;
        }
        if let Some(Value::Object(data)) = obj.get("data") {
            for c in &mut self.components {
                if let Some(Value::Object(entry)) = data.get(c.kind()) {
                    c.deserialize_from(entry);
                }
            }
        }
    }

    /// Append `key each-component [laps: N]` to `f` (`spec.md` §4.7). Tag,
    /// indentation and rank-prefixing are tree-position concerns decided
    /// by the caller (see `report::format_node_line`), not part of the
    /// bundle's own print operation.
    pub fn print(&self, f: &mut dyn fmt::Write) -> fmt::Result {
        write!(f, "{}", self.key)?;
        let available: Vec<&Box<dyn Component>> =
            self.components.iter().filter(|c| c.is_available()).collect();
        if !available.is_empty() {
            write!(f, " ")?;
        }
        let total = available.len();
        for (index, c) in available.into_iter().enumerate() {
            c.print(f, index, total)?;
        }
        write!(f, " [laps: {}]", self.laps)
    }

    /// [`Bundle::print`] rendered to an owned `String`.
    pub fn print_to_string(&self) -> String {
        let mut s = String::new();
        self.print(&mut s).expect("writing to String is infallible");
        s
    }
}
