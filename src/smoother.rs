//! Linear parameter smoothing

use libm::Libm;

/// Ramps linearly from the current value to a pushed target over a fixed
/// number of samples.
#[derive(Debug, Clone, Copy)]
pub struct LinearSmoother {
    value: f64,
    target: f64,
    step: f64,
    remaining: u32,
    ramp_samples: f64,
}

impl LinearSmoother {
    pub fn new(value: f64, ramp_samples: f64) -> Self {
        Self {
            value,
            target: value,
            step: 0.0,
            remaining: 0,
            ramp_samples: ramp_samples.max(1.0),
        }
    }

    /// Set the ramp length used by subsequent pushes
    pub fn set_ramp_samples(&mut self, samples: f64) {
        self.ramp_samples = samples.max(1.0);
    }

    /// Jump to `value` with no ramp
    pub fn reset(&mut self, value: f64) {
        self.value = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Start ramping toward `target`
    pub fn push(&mut self, target: f64) {
        if target == self.target {
            return;
        }
        self.target = target;
        let samples = Libm::<f64>::round(self.ramp_samples).max(1.0);
        self.remaining = samples as u32;
        self.step = (target - self.value) / samples;
    }

    /// Advance one sample and return the smoothed value
    #[inline]
    pub fn process(&mut self) -> f64 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.value = if self.remaining == 0 {
                self.target
            } else {
                self.value + self.step
            };
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}
