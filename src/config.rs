//! Setup-time configuration
//!
//! A [`SynthConfig`] describes everything that sizes storage: sample rate,
//! slot count, event queue capacity and the crossfade window. Changing any
//! of it means rebuilding the pool, which must only happen while the audio
//! thread is quiesced.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tone::ToneKind;

/// Hard upper bound on the number of voice slots
pub const MAX_VOICES: usize = 128;

/// Default event queue capacity per block
pub const DEFAULT_EVENT_CAPACITY: usize = 512;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Number of voice slots
    pub max_voices: usize,
    /// Maximum number of events buffered for one block
    pub event_capacity: usize,
    /// Length of the steal crossfade window in seconds
    pub transition_seconds: f64,
    /// Time constant for master gain and sustain smoothing in seconds
    pub smoothing_seconds: f64,
    /// Seed for the per-instance random number generator
    pub seed: u64,
    /// Tone generator variant built into every slot
    pub tone: ToneKind,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            max_voices: 16,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            transition_seconds: 0.005,
            smoothing_seconds: 0.01,
            seed: 0x853c_49e6_748f_ea9b,
            tone: ToneKind::Sine,
        }
    }
}

impl SynthConfig {
    /// Create a configuration with the given sample rate and voice count
    pub fn new(sample_rate: f64, max_voices: usize) -> Self {
        Self {
            sample_rate,
            max_voices,
            ..Self::default()
        }
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_transition_seconds(mut self, seconds: f64) -> Self {
        self.transition_seconds = seconds;
        self
    }

    pub fn with_smoothing_seconds(mut self, seconds: f64) -> Self {
        self.smoothing_seconds = seconds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tone(mut self, tone: ToneKind) -> Self {
        self.tone = tone;
        self
    }

    /// Check the configuration before any storage is sized from it
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_sample_rate(self.sample_rate)?;
        ConfigError::check_voices(self.max_voices)?;
        if self.event_capacity == 0 {
            return Err(ConfigError::NoEventCapacity);
        }
        if !self.transition_seconds.is_finite() || self.transition_seconds < 0.0 {
            return Err(ConfigError::InvalidTransitionTime(self.transition_seconds));
        }
        Ok(())
    }

    /// Crossfade ring length in samples (one extra sample so a zero
    /// window still holds the frame that replaces the stolen voice)
    pub fn transition_len(&self) -> usize {
        1 + (self.sample_rate * self.transition_seconds) as usize
    }

    /// Smoothing time in samples, never below one
    pub fn smoothing_samples(&self) -> f64 {
        (self.sample_rate * self.smoothing_seconds.max(0.0)).max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SynthConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_sample_rate() {
        let config = SynthConfig::new(0.0, 8);
        assert_eq!(config.validate(), Err(ConfigError::InvalidSampleRate(0.0)));

        let config = SynthConfig::new(-44100.0, 8);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_voices() {
        let config = SynthConfig::new(48000.0, 0);
        assert_eq!(config.validate(), Err(ConfigError::NoVoices));
    }

    #[test]
    fn test_validate_rejects_bad_transition_and_capacity() {
        let config = SynthConfig::default().with_transition_seconds(-0.1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTransitionTime(_))
        ));

        let config = SynthConfig::default().with_event_capacity(0);
        assert_eq!(config.validate(), Err(ConfigError::NoEventCapacity));
    }

    #[test]
    fn test_transition_len() {
        let config = SynthConfig::new(48000.0, 4).with_transition_seconds(0.005);
        assert_eq!(config.transition_len(), 241);

        let config = config.with_transition_seconds(0.0);
        assert_eq!(config.transition_len(), 1);
    }

    #[test]
    fn test_builder() {
        let config = SynthConfig::new(44100.0, 32)
            .with_seed(7)
            .with_tone(ToneKind::Saw)
            .with_smoothing_seconds(0.02);
        assert_eq!(config.seed, 7);
        assert_eq!(config.tone, ToneKind::Saw);
        assert!((config.smoothing_samples() - 882.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: SynthConfig =
            serde_json::from_str(r#"{"sample_rate": 96000.0, "tone": "Pluck"}"#).unwrap();
        assert_eq!(config.sample_rate, 96000.0);
        assert_eq!(config.tone, ToneKind::Pluck);
        assert_eq!(config.max_voices, SynthConfig::default().max_voices);
        assert!(config.validate().is_ok());
    }
}
