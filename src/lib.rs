//! # Polyvoice: Real-Time Polyphonic Voice Scheduler
//!
//! `polyvoice` turns a stream of timestamped note events into a fixed pool of
//! sounding voices, each driven by envelope state machines, summed sample by
//! sample into a stereo output block. Everything on the audio path runs
//! without allocating, locking or blocking.
//!
//! ## Architecture
//!
//! The library is organized in three layers:
//!
//! - **Layer 1: Signal Primitives** - ADSR envelopes, parameter smoothing, tone generators
//! - **Layer 2: Voices** - Per-slot lifecycle (active, release, rest), panning, unison
//! - **Layer 3: Scheduling** - Event queue, voice pool with stealing, steal crossfade, block processing
//!
//! ## Features
//!
//! - **Sample-Accurate Events** - Note events take effect at their exact frame offset
//! - **Click-Free Stealing** - Stolen voices fade out through a short crossfade buffer
//! - **Pitch-Adapted Envelopes** - Exponential and linear ADSR with declick on cold start
//! - **Deterministic Output** - Per-instance seeded random state, bit-identical replays
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use polyvoice::prelude::*;
//!
//! // Eight voices at 48kHz
//! let mut synth = PolySynth::new(SynthConfig::new(48000.0, 8)).unwrap();
//!
//! // Shape the sound
//! synth.set_params(
//!     VoiceParams::default()
//!         .with_amp(AdsrParams::new(0.005, 0.2, 0.6, 0.4))
//!         .with_unison(UnisonConfig::new(2, 12.0)),
//! );
//!
//! // Process a block with a note starting a few samples in
//! let events = [NoteEvent::note_on(12, 1, 60, 0.9)];
//! let mut left = [0.0; 128];
//! let mut right = [0.0; 128];
//! synth.process(&events, &mut left, &mut right);
//! ```

pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod event;
pub mod params;
pub mod pool;
pub mod smoother;
pub mod synth;
pub mod tone;
pub mod transition;
pub mod voice;

/// Prelude module for convenient imports
pub mod prelude {
    // Configuration
    pub use crate::config::{SynthConfig, DEFAULT_EVENT_CAPACITY, MAX_VOICES};
    pub use crate::context::SynthContext;
    pub use crate::error::{ConfigError, QueueError};
    pub use crate::params::{UnisonConfig, VelocityCurve, VoiceParams};

    // Layer 1: Signal Primitives
    pub use crate::envelope::{AdsrParams, Envelope, EnvelopeCurve, EnvelopeStage};
    pub use crate::smoother::LinearSmoother;
    pub use crate::tone::{PluckTone, SawTone, SineTone, Tone, ToneGenerator, ToneKind};

    // Layer 2: Voices
    pub use crate::voice::{pitch_to_freq, NoteStart, Voice, VoiceState};

    // Layer 3: Scheduling
    pub use crate::event::{EventQueue, NoteEvent, NoteEventKind};
    pub use crate::pool::VoicePool;
    pub use crate::synth::PolySynth;
    pub use crate::transition::TransitionMixer;
}

// Re-export key types at crate root for convenience
pub use prelude::*;
