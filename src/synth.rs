//! Block processing front-end
//!
//! [`PolySynth`] ties the event queue to the voice pool. For each block it
//! applies the current parameter snapshot once, then walks the block sample
//! by sample: events due at a frame are dispatched before that frame is
//! rendered, so every note starts and stops exactly at its offset.
//!
//! ```rust
//! use polyvoice::prelude::*;
//!
//! let mut synth = PolySynth::new(SynthConfig::new(48000.0, 8)).unwrap();
//! let events = [NoteEvent::note_on(0, 1, 60, 0.8), NoteEvent::note_off(32, 1)];
//!
//! let mut left = [0.0; 64];
//! let mut right = [0.0; 64];
//! synth.process(&events, &mut left, &mut right);
//! assert!(left.iter().all(|s| s.is_finite()));
//! ```

use log::{debug, info, warn};

use crate::config::SynthConfig;
use crate::error::{ConfigError, QueueError};
use crate::event::{EventQueue, NoteEvent, NoteEventKind};
use crate::params::VoiceParams;
use crate::pool::VoicePool;
use crate::tone::{Tone, ToneGenerator};

/// Polyphonic voice scheduler with sample-accurate event dispatch
#[derive(Debug)]
pub struct PolySynth<G: ToneGenerator + Clone = Tone> {
    config: SynthConfig,
    prototype: G,
    pool: VoicePool<G>,
    queue: EventQueue,
    params: VoiceParams,
    dropped_events: u64,
}

impl PolySynth<Tone> {
    /// Build a synth whose slots use the built-in tone named by `config.tone`
    pub fn new(config: SynthConfig) -> Result<Self, ConfigError> {
        let tone = Tone::from_kind(config.tone);
        Self::with_tone(config, tone)
    }
}

impl<G: ToneGenerator + Clone> PolySynth<G> {
    /// Build a synth whose slots each hold a clone of `prototype`
    pub fn with_tone(config: SynthConfig, prototype: G) -> Result<Self, ConfigError> {
        let pool = Self::build_pool(&config, &prototype)?;
        Ok(Self {
            queue: EventQueue::with_capacity(config.event_capacity),
            config,
            prototype,
            pool,
            params: VoiceParams::default(),
            dropped_events: 0,
        })
    }

    /// Rebuild the pool for a new sample rate and slot count.
    ///
    /// All sounding voices and queued events are discarded. On error the
    /// previous configuration stays in place.
    pub fn configure(&mut self, sample_rate: f64, max_voices: usize) -> Result<(), ConfigError> {
        let config = SynthConfig {
            sample_rate,
            max_voices,
            ..self.config.clone()
        };
        let mut pool = Self::build_pool(&config, &self.prototype)?;
        pool.set_params(&self.params);

        self.pool = pool;
        self.queue = EventQueue::with_capacity(config.event_capacity);
        self.config = config;
        Ok(())
    }

    /// Store the parameter snapshot applied at the start of the next block
    pub fn set_params(&mut self, params: VoiceParams) {
        self.params = params;
    }

    /// Queue an event for the next block.
    ///
    /// Offsets at or past the end of that block are played on its last frame.
    pub fn push_event(&mut self, event: NoteEvent) -> Result<(), QueueError> {
        self.queue.push(event).map_err(|err| {
            self.dropped_events += 1;
            err
        })
    }

    /// Render one block.
    ///
    /// `events` are merged with anything queued through [`push_event`](Self::push_event)
    /// and dispatched at their frame offsets. The block length is the shorter
    /// of the two output buffers; the rest of the longer one is zeroed. An
    /// empty block renders nothing and keeps events queued for the next call.
    pub fn process(&mut self, events: &[NoteEvent], left: &mut [f64], right: &mut [f64]) {
        for event in events {
            // Overflow is counted in dropped_events.
            let _ = self.push_event(*event);
        }

        self.pool.set_params(&self.params);

        let frames = left.len().min(right.len());
        left[frames..].fill(0.0);
        right[frames..].fill(0.0);
        if frames == 0 {
            return;
        }

        let last = frames - 1;
        let unison = self.params.unison.voices;
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let due = if i == last { u32::MAX } else { i as u32 };
            let pool = &mut self.pool;
            self.queue.drain_at(due, |event| dispatch(pool, event, unison));

            let [frame_l, frame_r] = self.pool.process_frame();
            *l = frame_l;
            *r = frame_r;
        }
    }

    /// Start a note immediately, outside of block timing
    pub fn note_on(&mut self, id: i32, pitch: i16, velocity: f64) {
        self.pool.set_params(&self.params);
        self.pool
            .note_on(id, pitch, 0.0, velocity, self.params.unison.voices);
    }

    /// Release a note immediately
    pub fn note_off(&mut self, id: i32) {
        self.pool.note_off(id);
    }

    pub fn all_notes_off(&mut self) {
        self.pool.all_notes_off();
    }

    /// Silence everything and drop queued events
    pub fn panic(&mut self) {
        self.pool.panic();
        self.queue.clear();
    }

    /// Return to the freshly configured state. Replaying the same events
    /// after a reset reproduces the same output.
    pub fn reset(&mut self) {
        debug!(
            "resetting synth: {} voices at {} Hz",
            self.config.max_voices, self.config.sample_rate
        );
        self.pool.reset();
        self.queue.clear();
        self.dropped_events = 0;
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn params(&self) -> &VoiceParams {
        &self.params
    }

    pub fn pool(&self) -> &VoicePool<G> {
        &self.pool
    }

    /// Events rejected because the queue was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    fn build_pool(config: &SynthConfig, prototype: &G) -> Result<VoicePool<G>, ConfigError> {
        match VoicePool::new(config, prototype.clone()) {
            Ok(pool) => {
                info!(
                    "configured {} voices at {} Hz ({} event slots, {} frame crossfade)",
                    config.max_voices,
                    config.sample_rate,
                    config.event_capacity,
                    config.transition_len() - 1
                );
                Ok(pool)
            }
            Err(err) => {
                warn!("rejected configuration: {}", err);
                Err(err)
            }
        }
    }
}

#[inline]
fn dispatch<G: ToneGenerator>(pool: &mut VoicePool<G>, event: &NoteEvent, unison: usize) {
    match event.kind {
        NoteEventKind::NoteOn => pool.note_on(
            event.note_id,
            event.pitch,
            event.tuning_cents,
            event.velocity,
            unison,
        ),
        NoteEventKind::NoteOff => pool.note_off(event.note_id),
    }
}
