//! Error types
//!
//! Errors only exist on the setup path. Everything that runs inside the
//! audio callback either succeeds or degrades to silence.

use crate::config::MAX_VOICES;

/// Error types for configuration of the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Sample rate must be finite and strictly positive
    InvalidSampleRate(f64),
    /// At least one voice slot is required
    NoVoices,
    /// More voices than the pool can hold were requested
    TooManyVoices { requested: usize, max: usize },
    /// Crossfade window must be finite and non-negative
    InvalidTransitionTime(f64),
    /// The event queue needs room for at least one event
    NoEventCapacity,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidSampleRate(rate) => write!(f, "Invalid sample rate: {}", rate),
            ConfigError::NoVoices => write!(f, "Voice count must be at least 1"),
            ConfigError::TooManyVoices { requested, max } => {
                write!(f, "Requested {} voices, at most {} supported", requested, max)
            }
            ConfigError::InvalidTransitionTime(seconds) => {
                write!(f, "Invalid transition time: {} s", seconds)
            }
            ConfigError::NoEventCapacity => write!(f, "Event capacity must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    /// Check a requested voice count against the supported range
    pub(crate) fn check_voices(max_voices: usize) -> Result<(), ConfigError> {
        if max_voices == 0 {
            return Err(ConfigError::NoVoices);
        }
        if max_voices > MAX_VOICES {
            return Err(ConfigError::TooManyVoices {
                requested: max_voices,
                max: MAX_VOICES,
            });
        }
        Ok(())
    }

    /// Check a sample rate
    pub(crate) fn check_sample_rate(sample_rate: f64) -> Result<(), ConfigError> {
        if sample_rate.is_finite() && sample_rate > 0.0 {
            Ok(())
        } else {
            Err(ConfigError::InvalidSampleRate(sample_rate))
        }
    }
}

/// Error returned when pushing into a full event queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    Full { capacity: usize },
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Full { capacity } => {
                write!(f, "Event queue full (capacity {})", capacity)
            }
        }
    }
}

impl std::error::Error for QueueError {}
