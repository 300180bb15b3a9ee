use super::rusage;
use super::{Capabilities, Component, DerivationInputs};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::time::Duration;

/// Total CPU time (user + system) consumed by the process, sampled via
/// `getrusage(2)`.
#[derive(Debug, Clone, Default)]
pub struct CpuClock {
    start: Option<Duration>,
    accumulated: Duration,
}

impl CpuClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated
    }
}

impl Component for CpuClock {
    fn kind(&self) -> &'static str {
        "cpu_clock"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            is_timing_category: true,
            uses_timing_units: true,
            supports_flamegraph: true,
            ..Default::default()
        }
    }

    fn start(&mut self) {
        self.start = Some(rusage::now().total());
    }

    fn stop(&mut self) {
        if let Some(start) = self.start.take() {
            let now = rusage::now().total();
            self.accumulated += now.saturating_sub(start);
        }
    }

    fn conditional_start(&mut self) -> bool {
        if self.start.is_some() {
            false
        } else {
            self.start();
            true
        }
    }

    fn conditional_stop(&mut self) -> bool {
        if self.start.is_some() {
            self.stop();
            true
        } else {
            false
        }
    }

    fn record(&mut self) {}

    fn reset(&mut self) {
        self.start = None;
        self.accumulated = Duration::ZERO;
    }

    fn add_assign(&mut self, other: &dyn Component) {
        if let Some(o) = other.as_any().downcast_ref::<CpuClock>() {
            self.accumulated += o.accumulated;
        }
    }

    fn sub_assign(&mut self, other: &dyn Component) {
        if let Some(o) = other.as_any().downcast_ref::<CpuClock>() {
            self.accumulated = self.accumulated.saturating_sub(o.accumulated);
        }
    }

    fn scale(&mut self, factor: f64) {
        self.accumulated = Duration::from_secs_f64(self.accumulated.as_secs_f64() * factor);
    }

    fn serialize_into(&self, map: &mut Map<String, Value>) {
        map.insert("value".into(), Value::from(self.accumulated.as_secs_f64()));
        map.insert("unit".into(), Value::from("sec"));
    }

    fn deserialize_from(&mut self, map: &Map<String, Value>) {
        if let Some(secs) = map.get("value").and_then(Value::as_f64) {
            self.accumulated = Duration::from_secs_f64(secs);
        }
    }

    fn print(&self, f: &mut dyn fmt::Write, index: usize, total: usize) -> fmt::Result {
        write!(f, "cpu_clock: {:.6} sec", self.accumulated.as_secs_f64())?;
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
        Some(self.accumulated.as_secs_f64())
    }

    fn apply_derivation(&mut self, _inputs: &DerivationInputs) {}
}
