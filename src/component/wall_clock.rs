use super::{Capabilities, Component, DerivationInputs};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::time::{Duration, Instant};

/// Wall-clock (elapsed real time) component.
#[derive(Debug, Clone)]
pub struct WallClock {
    running_since: Option<Instant>,
    accumulated: Duration,
}

impl Default for WallClock {
    fn default() -> Self {
        WallClock {
            running_since: None,
            accumulated: Duration::ZERO,
        }
    }
}

impl WallClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated
    }
}

impl Component for WallClock {
    fn kind(&self) -> &'static str {
        "wall_clock"
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
        self.running_since = Some(Instant::now());
    }

    fn stop(&mut self) {
        if let Some(start) = self.running_since.take() {
            self.accumulated += start.elapsed();
        }
    }

    fn conditional_start(&mut self) -> bool {
        if self.running_since.is_some() {
            false
        } else {
            self.start();
            true
        }
    }

    fn conditional_stop(&mut self) -> bool {
        if self.running_since.is_some() {
            self.stop();
            true
        } else {
            false
        }
    }

    fn record(&mut self) {
        // Wall clock is an interval component; a bare `record()` has
        // nothing meaningful to sample, so it is a no-op.
    }

    fn reset(&mut self) {
        self.running_since = None;
        self.accumulated = Duration::ZERO;
    }

    fn add_assign(&mut self, other: &dyn Component) {
        if let Some(o) = other.as_any().downcast_ref::<WallClock>() {
            self.accumulated += o.accumulated;
        }
    }

    fn sub_assign(&mut self, other: &dyn Component) {
        if let Some(o) = other.as_any().downcast_ref::<WallClock>() {
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
        write!(f, "wall_clock: {:.6} sec", self.accumulated.as_secs_f64())?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration as StdDuration;

    #[test]
    fn start_stop_accumulates() {
        let mut c = WallClock::new();
        c.start();
        thread::sleep(StdDuration::from_millis(5));
        c.stop();
        assert!(c.elapsed() >= StdDuration::from_millis(5));
    }

    #[test]
    fn reset_zeros_accumulator() {
        let mut c = WallClock::new();
        c.start();
        c.stop();
        c.reset();
        assert_eq!(c.elapsed(), Duration::ZERO);
    }
}
