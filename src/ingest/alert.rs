use crate::types::Sample;

/// Fixed-threshold vibration alert. No hysteresis: values hovering at the
/// threshold will flicker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertEvaluator {
    threshold: f64,
}

impl AlertEvaluator {
    pub const DEFAULT_THRESHOLD: f64 = 15.0;

    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn evaluate(&self, sample: &Sample) -> bool {
        sample.magnitude() > self.threshold
    }
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}
