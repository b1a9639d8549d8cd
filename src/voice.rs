//! Voice lifecycle
//!
//! A [`Voice`] is one slot of the pool: an id, pitch, pan and gain, an
//! amplitude and a modulation envelope, and a tone generator. Slots live for
//! the lifetime of the pool and are addressed by index only; stealing
//! overwrites a slot's contents in place.
//!
//! ```text
//!          note_on              note_off / steal        envelope silent
//!   Rest ──────────► Active ─────────────────► Release ───────────────► Rest
//!     ▲                                                                  │
//!     └──────────────────── forced rest (steal, fault) ◄─────────────────┘
//! ```

use libm::Libm;

use crate::context::SynthContext;
use crate::envelope::{Envelope, EnvelopeCurve, EnvelopeStage, SILENCE_THRESHOLD};
use crate::params::VoiceParams;
use crate::tone::{Tone, ToneGenerator};

/// Lifecycle state of a voice slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Sounding, envelopes in attack/decay/sustain
    Active,
    /// Note released, envelopes decaying
    Release,
    /// Silent and available
    Rest,
}

/// Note parameters assigned to a slot at note-on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteStart {
    pub id: i32,
    /// Fractional semitones, detune included
    pub pitch: f64,
    pub velocity: f64,
    /// -1.0 (left) to 1.0 (right)
    pub pan: f64,
    /// Share of the note's level carried by this slot
    pub gain: f64,
}

/// Convert a fractional MIDI pitch to Hz (A4 = 69 = 440 Hz)
#[inline]
pub fn pitch_to_freq(pitch: f64) -> f64 {
    440.0 * Libm::<f64>::exp2((pitch - 69.0) / 12.0)
}

/// A single voice slot
#[derive(Debug, Clone)]
pub struct Voice<G: ToneGenerator = Tone> {
    index: usize,
    state: VoiceState,
    id: i32,
    pitch: f64,
    freq: f64,
    velocity: f64,
    pan: f64,
    pan_left: f64,
    pan_right: f64,
    gain: f64,
    age: u64,
    pitch_env_semitones: f64,
    amp_env: Envelope,
    mod_env: Envelope,
    tone: G,
    faults: u32,
}

impl<G: ToneGenerator> Voice<G> {
    /// Create a resting voice. Call [`Voice::setup`] before use.
    pub fn new(index: usize, tone: G, sample_rate: f64) -> Self {
        Self {
            index,
            state: VoiceState::Rest,
            id: -1,
            pitch: 0.0,
            freq: 0.0,
            velocity: 0.0,
            pan: 0.0,
            pan_left: core::f64::consts::FRAC_1_SQRT_2,
            pan_right: core::f64::consts::FRAC_1_SQRT_2,
            gain: 0.0,
            age: 0,
            pitch_env_semitones: 0.0,
            amp_env: Envelope::new(EnvelopeCurve::Exponential, sample_rate),
            mod_env: Envelope::new(EnvelopeCurve::Linear, sample_rate),
            tone,
            faults: 0,
        }
    }

    /// Size storage for the context's sample rate and return to rest
    pub fn setup(&mut self, ctx: &SynthContext) {
        self.tone.setup(ctx.sample_rate());
        self.amp_env.set_sample_rate(ctx.sample_rate());
        self.mod_env.set_sample_rate(ctx.sample_rate());
        self.amp_env.set_smoothing(ctx.smoothing_samples());
        self.mod_env.set_smoothing(ctx.smoothing_samples());
        self.faults = 0;
        self.rest();
    }

    /// Start a note on this slot.
    ///
    /// A resting slot starts cold: tone restarted, envelopes from zero. A
    /// slot still sounding (retrigger of the same id) keeps its tone running
    /// and restarts the envelopes from their current level.
    pub fn note_on(&mut self, note: NoteStart, params: &VoiceParams, ctx: &mut SynthContext) {
        let cold = self.state == VoiceState::Rest;

        self.state = VoiceState::Active;
        self.id = note.id;
        self.pitch = note.pitch;
        self.freq = pitch_to_freq(note.pitch);
        self.velocity = note.velocity.clamp(0.0, 1.0);
        self.gain = note.gain;
        self.age = 0;
        self.set_pan(note.pan);
        self.pitch_env_semitones = params.pitch_env_semitones;

        self.amp_env.set_curve(params.amp_curve);
        self.amp_env.note_on(&params.amp, self.freq);
        self.mod_env.note_on(&params.mod_env, self.freq);

        if cold {
            self.tone.note_on(self.freq, ctx);
        }
    }

    /// Enter release. Only an active voice moves.
    pub fn release(&mut self) {
        if self.state == VoiceState::Active {
            self.amp_env.release();
            self.mod_env.release();
            self.state = VoiceState::Release;
        }
    }

    /// Force the slot to silence and unbind its id
    pub fn rest(&mut self) {
        self.state = VoiceState::Rest;
        self.id = -1;
        self.amp_env.terminate();
        self.mod_env.terminate();
        self.tone.reset();
    }

    /// Re-derive envelope rates from a new parameter snapshot
    pub fn apply_params(&mut self, params: &VoiceParams) {
        if self.state == VoiceState::Rest {
            return;
        }
        self.amp_env.set(&params.amp, self.freq);
        self.mod_env.set(&params.mod_env, self.freq);
        self.pitch_env_semitones = params.pitch_env_semitones;
    }

    /// Render one stereo frame.
    ///
    /// A non-finite sample resets the voice to rest and yields silence.
    #[inline]
    pub fn process(&mut self) -> [f64; 2] {
        if self.state == VoiceState::Rest {
            return [0.0, 0.0];
        }

        let amp = self.amp_env.process();
        let modulation = self.mod_env.process();
        let freq = if self.pitch_env_semitones != 0.0 {
            self.freq * Libm::<f64>::exp2(modulation * self.pitch_env_semitones / 12.0)
        } else {
            self.freq
        };

        let sig = self.tone.process(freq) * amp * self.velocity * self.gain;
        if !sig.is_finite() {
            self.faults = self.faults.saturating_add(1);
            self.rest();
            return [0.0, 0.0];
        }

        self.age = self.age.saturating_add(1);

        if self.state == VoiceState::Release
            && (self.amp_env.is_terminated() || self.amp_env.level() < SILENCE_THRESHOLD)
        {
            self.rest();
        }

        [sig * self.pan_left, sig * self.pan_right]
    }

    /// True while any envelope is in its attack segment
    pub fn is_attacking(&self) -> bool {
        self.state != VoiceState::Rest && (self.amp_env.is_attacking() || self.mod_env.is_attacking())
    }

    /// Loudness used to rank steal candidates
    pub fn current_gain(&self) -> f64 {
        if self.state == VoiceState::Rest {
            return 0.0;
        }
        self.velocity * self.gain * self.amp_env.level()
    }

    pub fn is_resting(&self) -> bool {
        self.state == VoiceState::Rest
    }

    /// Active or releasing, and bound to `id`
    pub fn is_playing(&self, id: i32) -> bool {
        self.state != VoiceState::Rest && self.id == id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Bound note id, or -1 while resting
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn frequency(&self) -> f64 {
        self.freq
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    /// Samples rendered since note-on
    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn amp_stage(&self) -> EnvelopeStage {
        self.amp_env.stage()
    }

    /// Number of times this slot was reset after producing a non-finite sample
    pub fn faults(&self) -> u32 {
        self.faults
    }

    pub fn tone(&self) -> &G {
        &self.tone
    }

    fn set_pan(&mut self, pan: f64) {
        self.pan = if pan.is_finite() { pan.clamp(-1.0, 1.0) } else { 0.0 };
        // Constant power
        let angle = (self.pan + 1.0) * core::f64::consts::FRAC_PI_4;
        self.pan_left = Libm::<f64>::cos(angle);
        self.pan_right = Libm::<f64>::sin(angle);
    }
}
