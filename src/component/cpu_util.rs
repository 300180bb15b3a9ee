use super::{Capabilities, Component, DerivationInputs};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;

/// CPU utilization, `100 * cpu_clock / wall_clock`.
///
/// This component never samples anything itself — `start`/`stop`/`record`
/// are no-ops. Its accumulator is populated by [`Component::apply_derivation`]
/// at report time, from whichever sibling bundle contains a `cpu_clock` and
/// a `wall_clock` (`spec.md` §4.1 "Derivation", exercised by the end-to-end
/// scenario in §8.6).
#[derive(Debug, Clone, Default)]
pub struct CpuUtilization {
    percent: f64,
}

impl CpuUtilization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }
}

impl Component for CpuUtilization {
    fn kind(&self) -> &'static str {
        "cpu_util"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            uses_percent_units: true,
            ..Default::default()
        }
    }

    fn start(&mut self) {}
    fn stop(&mut self) {}
    fn conditional_start(&mut self) -> bool {
        false
    }
    fn conditional_stop(&mut self) -> bool {
        false
    }
    fn record(&mut self) {}

    fn reset(&mut self) {
        self.percent = 0.0;
    }

    fn add_assign(&mut self, other: &dyn Component) {
        // Percentages are not additive across laps in a meaningful way;
        // merging keeps the most recently derived value, same as `timemory`
        // treats a derived component (no own accumulator state to sum).
        if let Some(o) = other.as_any().downcast_ref::<CpuUtilization>() {
            if o.percent != 0.0 {
                self.percent = o.percent;
            }
        }
    }

    fn sub_assign(&mut self, _other: &dyn Component) {}

    fn scale(&mut self, _factor: f64) {}

    fn serialize_into(&self, map: &mut Map<String, Value>) {
        map.insert("value".into(), Value::from(self.percent));
        map.insert("unit".into(), Value::from("percent"));
    }

    fn deserialize_from(&mut self, map: &Map<String, Value>) {
        if let Some(percent) = map.get("value").and_then(Value::as_f64) {
            self.percent = percent;
        }
    }

    fn print(&self, f: &mut dyn fmt::Write, index: usize, total: usize) -> fmt::Result {
        write!(f, "cpu_util: {:.2}%", self.percent)?;
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

    fn derivations(&self) -> &'static [&'static [&'static str]] {
        &[&["cpu_clock", "wall_clock"]]
    }

    fn apply_derivation(&mut self, inputs: &DerivationInputs) {
        if let (Some(cpu), Some(wall)) = (inputs.get("cpu_clock"), inputs.get("wall_clock")) {
            self.percent = if *wall > 0.0 { 100.0 * cpu / wall } else { 0.0 };
        }
    }

    fn primary_value(&self) -> Option<f64> {
        Some(self.percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_from_cpu_and_wall() {
        let mut util = CpuUtilization::new();
        let mut inputs = DerivationInputs::new();
        inputs.insert("cpu_clock", 0.2);
        inputs.insert("wall_clock", 0.2);
        util.apply_derivation(&inputs);
        assert!((util.percent() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_wall_clock_is_zero_percent() {
        let mut util = CpuUtilization::new();
        let mut inputs = DerivationInputs::new();
        inputs.insert("cpu_clock", 0.2);
        inputs.insert("wall_clock", 0.0);
        util.apply_derivation(&inputs);
        assert_eq!(util.percent(), 0.0);
    }
}
