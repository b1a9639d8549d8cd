//! Per-instance synthesis context
//!
//! Everything that would otherwise be global (random state, smoothing time
//! constants, the sample rate) lives in a [`SynthContext`] owned by one
//! scheduler instance and passed explicitly into setup, note-on and reset.
//! Two instances never share random state, and re-seeding an instance makes
//! its output reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SynthConfig;

/// Explicit per-instance state threaded through voice setup and note-on
#[derive(Debug, Clone)]
pub struct SynthContext {
    sample_rate: f64,
    smoothing_samples: f64,
    seed: u64,
    rng: StdRng,
}

impl SynthContext {
    /// Create a context for the given sample rate and seed
    pub fn new(sample_rate: f64, seed: u64) -> Self {
        Self {
            sample_rate,
            smoothing_samples: (0.01 * sample_rate).max(1.0),
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Build a context from a validated configuration
    pub fn from_config(config: &SynthConfig) -> Self {
        let mut ctx = Self::new(config.sample_rate, config.seed);
        ctx.smoothing_samples = config.smoothing_samples();
        ctx
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Smoothing time in samples
    pub fn smoothing_samples(&self) -> f64 {
        self.smoothing_samples
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Restart the random stream from the configured seed
    pub fn reseed(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    /// Uniform random value in [0.0, 1.0)
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform random value in [-1.0, 1.0)
    #[inline]
    pub fn next_f64_bipolar(&mut self) -> f64 {
        self.next_f64() * 2.0 - 1.0
    }
}
