//! Tone generators
//!
//! The scheduler treats sound production as an opaque capability: given the
//! current frequency, produce one sample. [`ToneGenerator`] is that seam.
//! [`Tone`] is the built-in tagged union whose variant is chosen once, when
//! voice slots are set up, so the per-sample call stays a plain match.

use libm::Libm;
use serde::{Deserialize, Serialize};

use crate::context::SynthContext;

/// Lowest frequency the pluck delay line is sized for
pub const PLUCK_MIN_FREQ: f64 = 20.0;

/// Capability interface for per-voice sound sources
pub trait ToneGenerator {
    /// Size internal storage for the sample rate. Not real-time safe.
    fn setup(&mut self, sample_rate: f64);

    /// Prepare for a new note. Must not allocate.
    fn note_on(&mut self, freq: f64, ctx: &mut SynthContext);

    /// Produce one sample at the given frequency
    fn process(&mut self, freq: f64) -> f64;

    /// Return to silence
    fn reset(&mut self);
}

/// Selects which [`Tone`] variant voice slots are built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ToneKind {
    #[default]
    Sine,
    Saw,
    Pluck,
}

/// Sine oscillator
#[derive(Debug, Clone, Default)]
pub struct SineTone {
    phase: f64,
    sample_rate: f64,
}

impl ToneGenerator for SineTone {
    fn setup(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.phase = 0.0;
    }

    fn note_on(&mut self, _freq: f64, _ctx: &mut SynthContext) {
        self.phase = 0.0;
    }

    #[inline]
    fn process(&mut self, freq: f64) -> f64 {
        let out = Libm::<f64>::sin(core::f64::consts::TAU * self.phase);
        self.phase += freq / self.sample_rate;
        self.phase -= Libm::<f64>::floor(self.phase);
        out
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Band-limited sawtooth (polyBLEP)
#[derive(Debug, Clone, Default)]
pub struct SawTone {
    phase: f64,
    sample_rate: f64,
}

impl SawTone {
    #[inline]
    fn poly_blep(t: f64, dt: f64) -> f64 {
        if t < dt {
            let t = t / dt;
            t + t - t * t - 1.0
        } else if t > 1.0 - dt {
            let t = (t - 1.0) / dt;
            t * t + t + t + 1.0
        } else {
            0.0
        }
    }
}

impl ToneGenerator for SawTone {
    fn setup(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.phase = 0.0;
    }

    fn note_on(&mut self, _freq: f64, ctx: &mut SynthContext) {
        // Random start phase keeps stacked unison voices from summing coherently.
        self.phase = ctx.next_f64();
    }

    #[inline]
    fn process(&mut self, freq: f64) -> f64 {
        let dt = (freq / self.sample_rate).clamp(0.0, 0.5);
        let out = 2.0 * self.phase - 1.0 - Self::poly_blep(self.phase, dt);
        self.phase += dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        out
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Karplus-Strong plucked string.
///
/// The delay line is sized in `setup` for [`PLUCK_MIN_FREQ`] and filled with
/// a noise burst from the context at note-on.
#[derive(Debug, Clone)]
pub struct PluckTone {
    buffer: Vec<f64>,
    write: usize,
    last: f64,
    feedback: f64,
    sample_rate: f64,
}

impl Default for PluckTone {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            write: 0,
            last: 0.0,
            feedback: 0.996,
            sample_rate: 0.0,
        }
    }
}

impl PluckTone {
    pub fn with_feedback(mut self, feedback: f64) -> Self {
        self.feedback = feedback.clamp(0.0, 1.0);
        self
    }

    #[inline]
    fn read(&self, delay: f64) -> f64 {
        let len = self.buffer.len();
        let delay_floor = Libm::<f64>::floor(delay);
        let frac = delay - delay_floor;
        let d = delay_floor as usize;
        let i0 = (self.write + len - d) % len;
        let i1 = (self.write + len - d - 1) % len;
        self.buffer[i0] + frac * (self.buffer[i1] - self.buffer[i0])
    }
}

impl ToneGenerator for PluckTone {
    fn setup(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let len = Libm::<f64>::ceil(sample_rate / PLUCK_MIN_FREQ) as usize + 2;
        self.buffer = vec![0.0; len];
        self.write = 0;
        self.last = 0.0;
    }

    fn note_on(&mut self, _freq: f64, ctx: &mut SynthContext) {
        for sample in &mut self.buffer {
            *sample = 0.5 * ctx.next_f64_bipolar();
        }
        self.write = 0;
        self.last = 0.0;
    }

    #[inline]
    fn process(&mut self, freq: f64) -> f64 {
        let len = self.buffer.len();
        if len < 4 {
            return 0.0;
        }
        let delay = (self.sample_rate / freq).clamp(1.0, (len - 2) as f64);
        let out = self.read(delay);
        let filtered = 0.5 * (out + self.last) * self.feedback;
        self.last = out;
        self.buffer[self.write] = filtered;
        self.write = (self.write + 1) % len;
        out
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
        self.last = 0.0;
    }
}

/// Built-in tone generator, one variant per [`ToneKind`]
#[derive(Debug, Clone)]
pub enum Tone {
    Sine(SineTone),
    Saw(SawTone),
    Pluck(PluckTone),
}

impl Tone {
    pub fn from_kind(kind: ToneKind) -> Self {
        match kind {
            ToneKind::Sine => Tone::Sine(SineTone::default()),
            ToneKind::Saw => Tone::Saw(SawTone::default()),
            ToneKind::Pluck => Tone::Pluck(PluckTone::default()),
        }
    }

    pub fn kind(&self) -> ToneKind {
        match self {
            Tone::Sine(_) => ToneKind::Sine,
            Tone::Saw(_) => ToneKind::Saw,
            Tone::Pluck(_) => ToneKind::Pluck,
        }
    }
}

impl Default for Tone {
    fn default() -> Self {
        Self::from_kind(ToneKind::default())
    }
}

impl ToneGenerator for Tone {
    fn setup(&mut self, sample_rate: f64) {
        match self {
            Tone::Sine(t) => t.setup(sample_rate),
            Tone::Saw(t) => t.setup(sample_rate),
            Tone::Pluck(t) => t.setup(sample_rate),
        }
    }

    fn note_on(&mut self, freq: f64, ctx: &mut SynthContext) {
        match self {
            Tone::Sine(t) => t.note_on(freq, ctx),
            Tone::Saw(t) => t.note_on(freq, ctx),
            Tone::Pluck(t) => t.note_on(freq, ctx),
        }
    }

    #[inline]
    fn process(&mut self, freq: f64) -> f64 {
        match self {
            Tone::Sine(t) => t.process(freq),
            Tone::Saw(t) => t.process(freq),
            Tone::Pluck(t) => t.process(freq),
        }
    }

    fn reset(&mut self) {
        match self {
            Tone::Sine(t) => t.reset(),
            Tone::Saw(t) => t.reset(),
            Tone::Pluck(t) => t.reset(),
        }
    }
}
