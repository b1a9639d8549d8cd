//! ADSR Envelope Generator
//!
//! Per-voice amplitude/modulation envelope with two numeric variants.
//!
//! # Stages
//!
//! ```text
//!   Attack ──► Decay ──► Sustain ──► Release ──► Terminated
//!     │          │          │           ▲
//!     └──────────┴──────────┴───────────┘  release() from any sounding stage
//! ```
//!
//! Every segment is driven by a normalized progress value `phi` in [0, 1]:
//!
//! - attack:  `out = start + (1 - start) * phi`
//! - decay:   `out = 1 - (1 - sustain) * phi`
//! - release: `out = range * (1 - phi)`
//!
//! where `start` is the level the attack began from (0 on a cold start, the
//! current level on a retrigger) and `range` is the level captured when the
//! release began. Each segment therefore begins exactly where the previous
//! one stopped.
//!
//! # Curves
//!
//! - [`EnvelopeCurve::Exponential`]: a counter starts at 1 and is multiplied
//!   by `m` every sample, with `m` solved so that `m^n = 1e-5` for a segment
//!   of `n` samples. `phi = (1 - counter) / (1 - 1e-5)`. The segment ends
//!   when the counter falls to the floor, and the counter resets to 1.
//! - [`EnvelopeCurve::Linear`]: progress grows by `1 / n` every sample and the
//!   segment ends when it reaches 1.
//!
//! Attack and release are stretched to cover a few periods of the note
//! (4 for exponential, 1 for linear, capped at 100 ms) so very low notes do
//! not click. Every segment lasts at least 1 ms.
//!
//! A cosine fade-in of about 1 ms multiplies the output after a cold start.

use libm::Libm;
use serde::{Deserialize, Serialize};

use crate::smoother::LinearSmoother;

/// Floor used by the exponential curve and for silence detection
pub const SILENCE_THRESHOLD: f64 = 1e-5;

/// Shortest allowed segment
pub const MIN_SEGMENT_SECONDS: f64 = 0.001;

/// Length of the fade-in applied after a cold start
pub const DECLICK_SECONDS: f64 = 0.001;

/// Upper bound on the pitch-adapted minimum for attack and release
const MAX_ADAPTED_SECONDS: f64 = 0.1;

/// Segment shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnvelopeCurve {
    #[default]
    Exponential,
    Linear,
}

impl EnvelopeCurve {
    /// Number of note periods attack and release must cover
    fn min_cycles(self) -> f64 {
        match self {
            EnvelopeCurve::Exponential => 4.0,
            EnvelopeCurve::Linear => 1.0,
        }
    }
}

/// Envelope segment times in seconds and sustain level in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdsrParams {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

impl AdsrParams {
    pub fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Sustain level clamped into [0, 1]; non-finite input counts as 1
    pub fn sustain_level(&self) -> f64 {
        if self.sustain.is_finite() {
            self.sustain.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }
}

/// Current stage of the envelope state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Attack,
    Decay,
    Sustain,
    Release,
    Terminated,
}

/// Half-cosine fade-in
#[derive(Debug, Clone, Copy)]
struct Declick {
    counter: u32,
    length: u32,
}

impl Declick {
    fn new(sample_rate: f64, seconds: f64) -> Self {
        let length = Libm::<f64>::round(sample_rate * seconds.max(0.0)) as u32;
        Self {
            counter: length,
            length,
        }
    }

    fn start(&mut self) {
        self.counter = 0;
    }

    fn finish(&mut self) {
        self.counter = self.length;
    }

    #[inline]
    fn apply(&mut self, input: f64) -> f64 {
        if self.counter >= self.length {
            return input;
        }
        self.counter += 1;
        let t = self.counter as f64 / self.length as f64;
        input * 0.5 * (1.0 - Libm::<f64>::cos(core::f64::consts::PI * t))
    }
}

/// ADSR envelope generator
#[derive(Debug, Clone)]
pub struct Envelope {
    curve: EnvelopeCurve,
    /// Curve to switch to once the envelope is silent
    pending_curve: EnvelopeCurve,
    sample_rate: f64,
    stage: EnvelopeStage,
    /// Exponential: decaying counter in [floor, 1]. Linear: progress in [0, 1].
    ramp: f64,
    attack_coef: f64,
    decay_coef: f64,
    release_coef: f64,
    start: f64,
    range: f64,
    sustain: LinearSmoother,
    output: f64,
    level: f64,
    declick_seconds: f64,
    declick: Declick,
}

impl Envelope {
    pub fn new(curve: EnvelopeCurve, sample_rate: f64) -> Self {
        let mut env = Self {
            curve,
            pending_curve: curve,
            sample_rate,
            stage: EnvelopeStage::Terminated,
            ramp: 0.0,
            attack_coef: 0.0,
            decay_coef: 0.0,
            release_coef: 0.0,
            start: 0.0,
            range: 0.0,
            sustain: LinearSmoother::new(1.0, 1.0),
            output: 0.0,
            level: 0.0,
            declick_seconds: DECLICK_SECONDS,
            declick: Declick::new(sample_rate, DECLICK_SECONDS),
        };
        let params = AdsrParams::default();
        env.reset_ramp();
        env.set(&params, 0.0);
        env.sustain.reset(params.sustain_level());
        env
    }

    /// Override the fade-in length applied after a cold start
    pub fn with_declick(mut self, seconds: f64) -> Self {
        self.declick_seconds = seconds;
        self.declick = Declick::new(self.sample_rate, seconds);
        self
    }

    pub fn curve(&self) -> EnvelopeCurve {
        self.curve
    }

    /// Switch curve.
    ///
    /// A terminated envelope switches at once. A sounding one keeps its
    /// current curve, retriggers included, until it next falls silent.
    pub fn set_curve(&mut self, curve: EnvelopeCurve) {
        self.pending_curve = curve;
        if self.stage == EnvelopeStage::Terminated {
            self.apply_pending_curve();
        }
    }

    /// Change the sample rate. Silences the envelope; segment coefficients
    /// are re-derived on the next `note_on` or `set`.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.declick = Declick::new(sample_rate, self.declick_seconds);
        self.terminate();
    }

    /// Set the sustain smoothing time in samples
    pub fn set_smoothing(&mut self, samples: f64) {
        self.sustain.set_ramp_samples(samples);
    }

    /// Start the attack.
    ///
    /// From the terminated state the attack begins at zero behind a fade-in.
    /// Otherwise it begins at the current level.
    pub fn note_on(&mut self, params: &AdsrParams, note_freq: f64) {
        if self.stage == EnvelopeStage::Terminated {
            self.apply_pending_curve();
            self.start = 0.0;
            self.declick.start();
        } else {
            self.start = self.level;
            self.declick.finish();
        }
        self.output = self.start;
        self.stage = EnvelopeStage::Attack;
        self.reset_ramp();
        self.sustain.reset(params.sustain_level());
        self.set(params, note_freq);
    }

    /// Update segment rates and sustain target without restarting.
    pub fn set(&mut self, params: &AdsrParams, note_freq: f64) {
        let attack = self.adapt_time(params.attack, note_freq);
        let release = self.adapt_time(params.release, note_freq);
        let decay = match self.curve {
            EnvelopeCurve::Exponential => clamp_segment(params.decay),
            EnvelopeCurve::Linear => self.adapt_time(params.decay, note_freq),
        };
        self.attack_coef = self.segment_coef(attack);
        self.decay_coef = self.segment_coef(decay);
        self.release_coef = self.segment_coef(release);
        self.sustain.push(params.sustain_level());
    }

    /// Enter release from any sounding stage, starting from the current output
    pub fn release(&mut self) {
        if matches!(
            self.stage,
            EnvelopeStage::Attack | EnvelopeStage::Decay | EnvelopeStage::Sustain
        ) {
            self.range = self.output;
            self.stage = EnvelopeStage::Release;
            self.reset_ramp();
        }
    }

    /// Jump straight to silence
    pub fn terminate(&mut self) {
        self.stage = EnvelopeStage::Terminated;
        self.curve = self.pending_curve;
        self.output = 0.0;
        self.level = 0.0;
        self.start = 0.0;
        self.range = 0.0;
        self.declick.finish();
        self.reset_ramp();
    }

    /// Advance one sample
    #[inline]
    pub fn process(&mut self) -> f64 {
        match self.stage {
            EnvelopeStage::Attack => {
                let (phi, done) = self.advance(self.attack_coef);
                self.output = self.start + (1.0 - self.start) * phi;
                if done {
                    self.stage = EnvelopeStage::Decay;
                    self.reset_ramp();
                }
            }
            EnvelopeStage::Decay => {
                let sustain = self.sustain.process();
                let (phi, done) = self.advance(self.decay_coef);
                self.output = 1.0 - (1.0 - sustain) * phi;
                if done {
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                self.output = self.sustain.process();
            }
            EnvelopeStage::Release => {
                let (phi, done) = self.advance(self.release_coef);
                self.output = self.range * (1.0 - phi);
                if done {
                    self.stage = EnvelopeStage::Terminated;
                    self.output = 0.0;
                }
            }
            EnvelopeStage::Terminated => {
                self.output = 0.0;
            }
        }
        self.level = self.declick.apply(self.output);
        self.level
    }

    /// Last output value, fade-in included
    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn is_attacking(&self) -> bool {
        self.stage == EnvelopeStage::Attack
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == EnvelopeStage::Release
    }

    pub fn is_terminated(&self) -> bool {
        self.stage == EnvelopeStage::Terminated
    }

    /// Largest change a single sample of the current segment can produce,
    /// ignoring the fade-in and sustain smoothing
    pub fn max_step(&self) -> f64 {
        let first = |coef: f64| match self.curve {
            EnvelopeCurve::Exponential => (1.0 - coef) / (1.0 - SILENCE_THRESHOLD),
            EnvelopeCurve::Linear => coef.min(1.0),
        };
        match self.stage {
            EnvelopeStage::Attack => (1.0 - self.start) * first(self.attack_coef),
            EnvelopeStage::Decay => (1.0 - self.sustain.value()) * first(self.decay_coef),
            EnvelopeStage::Release => self.range * first(self.release_coef),
            EnvelopeStage::Sustain | EnvelopeStage::Terminated => 0.0,
        }
    }

    /// Stretch a segment so it covers enough periods of the note
    fn adapt_time(&self, seconds: f64, note_freq: f64) -> f64 {
        let seconds = clamp_segment(seconds);
        if !(note_freq.is_finite() && note_freq > 0.0) {
            return seconds;
        }
        let cycle = (self.curve.min_cycles() / note_freq).min(MAX_ADAPTED_SECONDS);
        seconds.max(cycle)
    }

    /// Per-sample multiplier or increment for a segment of `seconds`
    fn segment_coef(&self, seconds: f64) -> f64 {
        let samples = (seconds * self.sample_rate).max(1.0);
        match self.curve {
            EnvelopeCurve::Exponential => Libm::<f64>::pow(SILENCE_THRESHOLD, 1.0 / samples),
            EnvelopeCurve::Linear => 1.0 / samples,
        }
    }

    fn apply_pending_curve(&mut self) {
        if self.curve != self.pending_curve {
            self.curve = self.pending_curve;
            self.reset_ramp();
        }
    }

    fn reset_ramp(&mut self) {
        self.ramp = match self.curve {
            EnvelopeCurve::Exponential => 1.0,
            EnvelopeCurve::Linear => 0.0,
        };
    }

    /// Step the ramp; returns segment progress and whether it completed
    #[inline]
    fn advance(&mut self, coef: f64) -> (f64, bool) {
        match self.curve {
            EnvelopeCurve::Exponential => {
                self.ramp *= coef;
                if self.ramp <= SILENCE_THRESHOLD {
                    self.ramp = SILENCE_THRESHOLD;
                    (1.0, true)
                } else {
                    ((1.0 - self.ramp) / (1.0 - SILENCE_THRESHOLD), false)
                }
            }
            EnvelopeCurve::Linear => {
                self.ramp += coef;
                if self.ramp >= 1.0 {
                    self.ramp = 1.0;
                    (1.0, true)
                } else {
                    (self.ramp, false)
                }
            }
        }
    }
}

fn clamp_segment(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.max(MIN_SEGMENT_SECONDS)
    } else {
        MIN_SEGMENT_SECONDS
    }
}
