//! Per-block parameter snapshots
//!
//! Parameters arrive from an automation layer outside the scheduler as
//! already-smoothed values. The scheduler reads a [`VoiceParams`] snapshot
//! once per block and never writes back to it.

use libm::Libm;
use serde::{Deserialize, Serialize};

use crate::envelope::{AdsrParams, EnvelopeCurve};

/// Unison configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnisonConfig {
    /// Number of stacked voices per note (1 = no unison)
    pub voices: usize,
    /// Detune spread in cents (total spread across all voices)
    pub detune_cents: f64,
    /// Stereo spread (0.0 = mono, 1.0 = full stereo)
    pub stereo_spread: f64,
    /// Random detune jitter as a fraction of `detune_cents`
    pub random_detune: f64,
}

impl Default for UnisonConfig {
    fn default() -> Self {
        Self {
            voices: 1,
            detune_cents: 0.0,
            stereo_spread: 0.0,
            random_detune: 0.0,
        }
    }
}

impl UnisonConfig {
    /// Create a unison configuration
    pub fn new(voices: usize, detune_cents: f64) -> Self {
        Self {
            voices: voices.max(1),
            detune_cents,
            stereo_spread: 0.5,
            random_detune: 0.0,
        }
    }

    /// Detune offset in semitones for a unison index.
    ///
    /// `jitter` is a bipolar random value scaled by `random_detune`.
    pub fn detune_offset(&self, voice_index: usize, jitter: f64) -> f64 {
        if self.voices <= 1 {
            return 0.0;
        }

        let normalized = voice_index as f64 / (self.voices - 1) as f64;
        let centered = normalized * 2.0 - 1.0; // -1 to +1
        let cents = (centered + jitter * self.random_detune) * self.detune_cents;
        cents / 100.0
    }

    /// Pan position (-1.0 = left, 1.0 = right) for a unison index.
    ///
    /// `rotation` shifts which index lands on which side.
    pub fn pan_position(&self, voice_index: usize, rotation: usize) -> f64 {
        if self.voices <= 1 {
            return 0.0;
        }

        let slot = (voice_index + rotation) % self.voices;
        let normalized = slot as f64 / (self.voices - 1) as f64;
        let centered = normalized * 2.0 - 1.0;
        (centered * self.stereo_spread).clamp(-1.0, 1.0)
    }

    /// Gain per stacked voice that keeps the summed level consistent
    pub fn voice_gain(&self) -> f64 {
        1.0 / Libm::<f64>::sqrt(self.voices.max(1) as f64)
    }
}

/// Mapping from note velocity to voice level
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum VelocityCurve {
    /// Level equals velocity
    #[default]
    Linear,
    /// Velocity spans `min_db` to 0 dB; zero velocity is silent
    Decibel { min_db: f64 },
}

impl VelocityCurve {
    /// Level in [0.0, 1.0] for a velocity in [0.0, 1.0]
    pub fn map(&self, velocity: f64) -> f64 {
        let velocity = if velocity.is_finite() {
            velocity.clamp(0.0, 1.0)
        } else {
            0.0
        };
        match *self {
            VelocityCurve::Linear => velocity,
            VelocityCurve::Decibel { min_db } => {
                if velocity <= 0.0 {
                    0.0
                } else {
                    let db = min_db.min(0.0) * (1.0 - velocity);
                    Libm::<f64>::pow(10.0, db / 20.0)
                }
            }
        }
    }
}

/// Parameter snapshot read by the scheduler at block boundaries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceParams {
    /// Amplitude envelope
    pub amp: AdsrParams,
    /// Numeric variant of the amplitude envelope
    pub amp_curve: EnvelopeCurve,
    /// Modulation envelope (always linear)
    pub mod_env: AdsrParams,
    /// Pitch offset in semitones at full modulation envelope output
    pub pitch_env_semitones: f64,
    pub unison: UnisonConfig,
    pub velocity_curve: VelocityCurve,
    /// Output gain applied after voices are summed
    pub master_gain: f64,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            amp: AdsrParams::default(),
            amp_curve: EnvelopeCurve::Exponential,
            mod_env: AdsrParams::new(0.0, 0.2, 0.0, 0.2),
            pitch_env_semitones: 0.0,
            unison: UnisonConfig::default(),
            velocity_curve: VelocityCurve::Linear,
            master_gain: 0.5,
        }
    }
}

impl VoiceParams {
    pub fn with_amp(mut self, amp: AdsrParams) -> Self {
        self.amp = amp;
        self
    }

    pub fn with_amp_curve(mut self, curve: EnvelopeCurve) -> Self {
        self.amp_curve = curve;
        self
    }

    pub fn with_pitch_env(mut self, mod_env: AdsrParams, semitones: f64) -> Self {
        self.mod_env = mod_env;
        self.pitch_env_semitones = semitones;
        self
    }

    pub fn with_unison(mut self, unison: UnisonConfig) -> Self {
        self.unison = unison;
        self
    }

    pub fn with_velocity_curve(mut self, curve: VelocityCurve) -> Self {
        self.velocity_curve = curve;
        self
    }

    pub fn with_master_gain(mut self, gain: f64) -> Self {
        self.master_gain = gain;
        self
    }

    /// Master gain with non-finite or negative values replaced by silence
    pub fn safe_master_gain(&self) -> f64 {
        if self.master_gain.is_finite() {
            self.master_gain.max(0.0)
        } else {
            0.0
        }
    }
}
