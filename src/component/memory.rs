use super::{Capabilities, Component, DerivationInputs};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

/// Peak resident-set size, a gauge sampled via `getrusage(2)`'s `ru_maxrss`
/// rather than measured over an interval. Participates in the default
/// bundle only when [`crate::manager::Manager::record_memory`] is enabled
/// (`spec.md` §6).
#[derive(Debug, Clone, Default)]
pub struct PeakMemory {
    peak_bytes: u64,
    running: bool,
}

impl PeakMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes
    }

    fn sample(&mut self) {
        let current = current_maxrss_bytes();
        if current > self.peak_bytes {
            self.peak_bytes = current;
        }
    }
}

#[cfg(target_os = "macos")]
fn current_maxrss_bytes() -> u64 {
    // macOS reports ru_maxrss in bytes already.
    raw_maxrss()
}

#[cfg(not(target_os = "macos"))]
fn current_maxrss_bytes() -> u64 {
    // Linux (and most other unices) report ru_maxrss in kibibytes.
    raw_maxrss() * 1024
}

fn raw_maxrss() -> u64 {
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) != 0 {
            log::warn!("getrusage failed, peak memory will read zero");
            return 0;
        }
        usage.ru_maxrss.max(0) as u64
    }
}

impl Component for PeakMemory {
    fn kind(&self) -> &'static str {
        "peak_memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn start(&mut self) {
        self.running = true;
        self.sample();
    }

    fn stop(&mut self) {
        self.running = false;
        self.sample();
    }

    /// Start iff not already running, reporting whether a transition
    /// occurred so the bundle can adjust its lap counter accordingly
    /// (`spec.md` §4.1) — this gauge otherwise always claimed a transition,
    /// which corrupted laps under repeated `pause`/`resume`.
    fn conditional_start(&mut self) -> bool {
        if self.running {
            false
        } else {
            self.start();
            true
        }
    }

    /// Stop iff already running, mirroring [`PeakMemory::conditional_start`].
    fn conditional_stop(&mut self) -> bool {
        if self.running {
            self.stop();
            true
        } else {
            false
        }
    }

    fn record(&mut self) {
        self.sample();
    }

    fn reset(&mut self) {
        self.peak_bytes = 0;
        self.running = false;
    }

    fn add_assign(&mut self, other: &dyn Component) {
        if let Some(o) = other.as_any().downcast_ref::<PeakMemory>() {
            self.peak_bytes = self.peak_bytes.max(o.peak_bytes);
        }
    }

    fn sub_assign(&mut self, _other: &dyn Component) {
        // A high-water gauge has no meaningful subtraction; leave as-is.
    }

    fn scale(&mut self, _factor: f64) {}

    fn serialize_into(&self, map: &mut Map<String, Value>) {
        map.insert("value".into(), Value::from(self.peak_bytes));
        map.insert("unit".into(), Value::from("bytes"));
    }

    fn deserialize_from(&mut self, map: &Map<String, Value>) {
        if let Some(bytes) = map.get("value").and_then(Value::as_u64) {
            self.peak_bytes = bytes;
        }
    }

    fn print(&self, f: &mut dyn fmt::Write, index: usize, total: usize) -> fmt::Result {
        write!(f, "peak_memory: {} bytes", self.peak_bytes)?;
        if index + 1 < total {
            write!(f, ", ")?;
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn primary_value(&self) -> Option<f64> {
        Some(self.peak_bytes as f64)
    }

    fn apply_derivation(&mut self, _inputs: &DerivationInputs) {}
}
