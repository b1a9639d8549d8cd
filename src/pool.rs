//! Voice pool: allocation, stealing and per-sample mixing
//!
//! The pool owns a fixed array of [`Voice`] slots, created once at setup and
//! addressed only by index. `note_on` picks slots in this order:
//!
//! 1. slots already bound to the note id (retrigger)
//! 2. resting slots, lowest index first
//! 3. stolen slots: quietest non-attacking first, then oldest attacking
//!
//! A stolen slot is released, its next few milliseconds are rendered into
//! the [`TransitionMixer`] under a linear fade, and only then is it forced to
//! rest and handed to the new note.
//!
//! Nothing here allocates after construction: the candidate and steal lists
//! are reserved to the slot count up front.

use core::cmp::Ordering;

use crate::config::SynthConfig;
use crate::context::SynthContext;
use crate::error::ConfigError;
use crate::params::{UnisonConfig, VoiceParams};
use crate::smoother::LinearSmoother;
use crate::tone::{Tone, ToneGenerator};
use crate::transition::TransitionMixer;
use crate::voice::{NoteStart, Voice, VoiceState};

/// Fixed pool of voices
#[derive(Debug, Clone)]
pub struct VoicePool<G: ToneGenerator = Tone> {
    voices: Vec<Voice<G>>,
    candidates: Vec<usize>,
    steal_list: Vec<usize>,
    mixer: TransitionMixer,
    ctx: SynthContext,
    params: VoiceParams,
    master: LinearSmoother,
    /// Per-note counter rotating unison pan assignment
    pan_rotation: usize,
}

impl<G: ToneGenerator + Clone> VoicePool<G> {
    /// Build a pool of `config.max_voices` slots, each with its own clone of
    /// `prototype`. Not real-time safe.
    pub fn new(config: &SynthConfig, prototype: G) -> Result<Self, ConfigError> {
        config.validate()?;

        let ctx = SynthContext::from_config(config);
        let voices = (0..config.max_voices)
            .map(|i| {
                let mut voice = Voice::new(i, prototype.clone(), config.sample_rate);
                voice.setup(&ctx);
                voice
            })
            .collect();
        let params = VoiceParams::default();

        Ok(Self {
            voices,
            candidates: Vec::with_capacity(config.max_voices),
            steal_list: Vec::with_capacity(config.max_voices),
            mixer: TransitionMixer::new(config.transition_len()),
            master: LinearSmoother::new(params.safe_master_gain(), ctx.smoothing_samples()),
            ctx,
            params,
            pan_rotation: 0,
        })
    }
}

impl<G: ToneGenerator> VoicePool<G> {
    /// Start a note on `unison_count` slots (clamped to the pool size)
    pub fn note_on(
        &mut self,
        id: i32,
        pitch: i16,
        tuning_cents: f64,
        velocity: f64,
        unison_count: usize,
    ) {
        let wanted = unison_count.clamp(1, self.voices.len());
        self.collect_candidates(id, wanted);

        if self.candidates.len() < wanted {
            self.steal_order();
            for k in 0..wanted - self.candidates.len() {
                let index = self.steal_list[k];
                self.steal(index);
                self.candidates.push(index);
            }
        }

        let unison = UnisonConfig {
            voices: wanted,
            ..self.params.unison
        };
        let base = pitch as f64 + tuning_cents / 100.0;
        let level = self.params.velocity_curve.map(velocity);
        let gain = unison.voice_gain();
        let rotation = self.pan_rotation;
        self.pan_rotation = self.pan_rotation.wrapping_add(1);

        for u in 0..self.candidates.len() {
            let jitter = if unison.random_detune != 0.0 {
                self.ctx.next_f64_bipolar()
            } else {
                0.0
            };
            let note = NoteStart {
                id,
                pitch: base + unison.detune_offset(u, jitter),
                velocity: level,
                pan: unison.pan_position(u, rotation),
                gain,
            };
            let index = self.candidates[u];
            self.voices[index].note_on(note, &self.params, &mut self.ctx);
        }
    }

    /// Release every slot bound to `id`. Unknown ids are ignored.
    pub fn note_off(&mut self, id: i32) {
        for voice in &mut self.voices {
            if voice.is_playing(id) {
                voice.release();
            }
        }
    }

    /// Release every sounding slot
    pub fn all_notes_off(&mut self) {
        for voice in &mut self.voices {
            voice.release();
        }
    }

    /// Silence everything immediately, crossfade included
    pub fn panic(&mut self) {
        for voice in &mut self.voices {
            voice.rest();
        }
        self.mixer.clear();
    }

    /// Return to the freshly configured state, random stream included
    pub fn reset(&mut self) {
        self.panic();
        self.ctx.reseed();
        self.pan_rotation = 0;
        self.master.reset(self.params.safe_master_gain());
    }

    /// Apply a parameter snapshot. Envelope rates are only re-derived when
    /// the snapshot differs from the last one.
    pub fn set_params(&mut self, params: &VoiceParams) {
        if *params != self.params {
            self.params = *params;
            for voice in &mut self.voices {
                voice.apply_params(params);
            }
        }
        self.master.push(params.safe_master_gain());
    }

    /// Render one stereo frame: every sounding slot plus pending crossfade
    #[inline]
    pub fn process_frame(&mut self) -> [f64; 2] {
        let [mut left, mut right] = self.mixer.process();
        for voice in &mut self.voices {
            let [l, r] = voice.process();
            left += l;
            right += r;
        }
        let gain = self.master.process();
        [left * gain, right * gain]
    }

    /// Slots that are active or releasing
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_resting()).count()
    }

    /// Slots in exactly `state`
    pub fn count_in(&self, state: VoiceState) -> usize {
        self.voices.iter().filter(|v| v.state() == state).count()
    }

    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn slot(&self, index: usize) -> Option<&Voice<G>> {
        self.voices.get(index)
    }

    pub fn slots(&self) -> &[Voice<G>] {
        &self.voices
    }

    pub fn params(&self) -> &VoiceParams {
        &self.params
    }

    pub fn context(&self) -> &SynthContext {
        &self.ctx
    }

    pub fn mixer(&self) -> &TransitionMixer {
        &self.mixer
    }

    /// Total number of times a slot was reset after a non-finite sample
    pub fn recovered_voices(&self) -> u64 {
        self.voices.iter().map(|v| u64::from(v.faults())).sum()
    }

    /// Bound slots first, then resting slots, both in index order
    fn collect_candidates(&mut self, id: i32, wanted: usize) {
        self.candidates.clear();
        for voice in &self.voices {
            if self.candidates.len() == wanted {
                return;
            }
            if voice.is_playing(id) {
                self.candidates.push(voice.index());
            }
        }
        for voice in &self.voices {
            if self.candidates.len() == wanted {
                return;
            }
            if voice.is_resting() {
                self.candidates.push(voice.index());
            }
        }
    }

    /// Fill `steal_list` with every non-candidate slot, best victim first.
    ///
    /// Non-attacking slots come first, quietest first. Attacking slots are
    /// only taken once no other slot is left, oldest first. Remaining ties go
    /// to the lowest index.
    fn steal_order(&mut self) {
        self.steal_list.clear();
        for index in 0..self.voices.len() {
            if !self.candidates.contains(&index) {
                self.steal_list.push(index);
            }
        }

        let voices = &self.voices;
        self.steal_list.sort_unstable_by(|&a, &b| {
            let (va, vb) = (&voices[a], &voices[b]);
            let rank = match (va.is_attacking(), vb.is_attacking()) {
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                (false, false) => va.current_gain().total_cmp(&vb.current_gain()),
                (true, true) => vb.age().cmp(&va.age()),
            };
            rank.then(a.cmp(&b))
        });
    }

    /// Fade the slot's tail into the crossfade buffer, then silence it
    fn steal(&mut self, index: usize) {
        let voice = &mut self.voices[index];
        voice.release();
        self.mixer.capture(|| voice.process());
        voice.rest();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{AdsrParams, EnvelopeCurve};
    use crate::params::VelocityCurve;
    use crate::tone::ToneKind;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SAMPLE_RATE: f64 = 48000.0;

    /// Constant output, for reading envelope levels straight off the mix
    #[derive(Debug, Clone, Default)]
    struct Dc;

    impl ToneGenerator for Dc {
        fn setup(&mut self, _sample_rate: f64) {}
        fn note_on(&mut self, _freq: f64, _ctx: &mut SynthContext) {}
        fn process(&mut self, _freq: f64) -> f64 {
            1.0
        }
        fn reset(&mut self) {}
    }

    /// Produces NaN for notes above A4
    #[derive(Debug, Clone, Default)]
    struct Unstable;

    impl ToneGenerator for Unstable {
        fn setup(&mut self, _sample_rate: f64) {}
        fn note_on(&mut self, _freq: f64, _ctx: &mut SynthContext) {}
        fn process(&mut self, freq: f64) -> f64 {
            if freq > 441.0 {
                f64::NAN
            } else {
                0.5
            }
        }
        fn reset(&mut self) {}
    }

    fn pool<G: ToneGenerator + Clone>(voices: usize, tone: G) -> VoicePool<G> {
        let config = SynthConfig::new(SAMPLE_RATE, voices);
        VoicePool::new(&config, tone).unwrap()
    }

    /// Fast attack, full sustain
    fn plain_params() -> VoiceParams {
        VoiceParams::default()
            .with_amp(AdsrParams::new(0.001, 0.001, 1.0, 0.05))
            .with_master_gain(1.0)
    }

    fn run(pool: &mut VoicePool<impl ToneGenerator>, frames: usize) {
        for _ in 0..frames {
            pool.process_frame();
        }
    }

    fn ids(pool: &VoicePool<impl ToneGenerator>) -> Vec<i32> {
        pool.slots().iter().map(|v| v.id()).collect()
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let config = SynthConfig::new(0.0, 4);
        assert!(VoicePool::new(&config, Tone::default()).is_err());
        let config = SynthConfig::new(SAMPLE_RATE, 0);
        assert_eq!(
            VoicePool::new(&config, Tone::default()).err(),
            Some(ConfigError::NoVoices)
        );
    }

    #[test]
    fn test_allocates_resting_slots_in_order() {
        let mut pool = pool(4, Dc);
        pool.note_on(10, 60, 0.0, 1.0, 1);
        pool.note_on(11, 62, 0.0, 1.0, 1);
        assert_eq!(ids(&pool), vec![10, 11, -1, -1]);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn test_retrigger_reuses_bound_slot() {
        let mut pool = pool(4, Dc);
        pool.note_on(10, 60, 0.0, 1.0, 1);
        pool.note_on(11, 62, 0.0, 1.0, 1);
        run(&mut pool, 100);
        pool.note_on(10, 60, 0.0, 0.5, 1);
        assert_eq!(ids(&pool), vec![10, 11, -1, -1]);
        assert_eq!(pool.slot(0).map(|v| v.velocity()), Some(0.5));
        assert_eq!(pool.slot(0).map(|v| v.age()), Some(0));
    }

    #[test]
    fn test_steals_quietest_non_attacking() {
        let mut pool = pool(4, Dc);
        pool.set_params(&plain_params());
        for (id, vel) in [(1, 0.9), (2, 0.6), (3, 0.2), (4, 0.8)] {
            pool.note_on(id, 69, 0.0, vel, 1);
        }
        run(&mut pool, 2000);

        pool.note_on(5, 72, 0.0, 1.0, 1);
        assert_eq!(ids(&pool), vec![1, 2, 5, 4]);
        assert!(pool.mixer().is_pending());
    }

    #[test]
    fn test_steal_ties_go_to_lowest_index() {
        let mut pool = pool(4, Dc);
        pool.set_params(&plain_params());
        for (id, vel) in [(1, 0.9), (2, 0.3), (3, 0.3), (4, 0.3)] {
            pool.note_on(id, 69, 0.0, vel, 1);
        }
        run(&mut pool, 2000);

        pool.note_on(5, 72, 0.0, 1.0, 1);
        assert_eq!(ids(&pool), vec![1, 5, 3, 4]);
    }

    #[test]
    fn test_attacking_slots_are_protected() {
        let mut pool = pool(3, Dc);
        pool.set_params(&plain_params());
        pool.note_on(1, 69, 0.0, 1.0, 1);
        run(&mut pool, 2000);

        // Two slow, quiet attacks
        pool.set_params(&plain_params().with_amp(AdsrParams::new(1.0, 0.1, 1.0, 0.1)));
        pool.note_on(2, 69, 0.0, 0.1, 1);
        pool.note_on(3, 69, 0.0, 0.1, 1);
        run(&mut pool, 10);

        pool.note_on(4, 69, 0.0, 1.0, 1);
        assert_eq!(ids(&pool), vec![4, 2, 3]);
    }

    #[test]
    fn test_all_attacking_steals_oldest() {
        let mut pool = pool(3, Dc);
        pool.set_params(&plain_params().with_amp(AdsrParams::new(2.0, 0.1, 1.0, 0.1)));
        pool.note_on(1, 69, 0.0, 1.0, 1);
        run(&mut pool, 10);
        pool.note_on(2, 69, 0.0, 1.0, 1);
        run(&mut pool, 10);
        pool.note_on(3, 69, 0.0, 1.0, 1);
        run(&mut pool, 10);

        pool.note_on(4, 69, 0.0, 1.0, 1);
        assert_eq!(ids(&pool), vec![4, 2, 3]);
        pool.note_on(5, 69, 0.0, 1.0, 1);
        assert_eq!(ids(&pool), vec![4, 5, 3]);
    }

    #[test]
    fn test_releasing_slot_is_stolen_before_sustaining_one() {
        let mut pool = pool(2, Dc);
        pool.set_params(&plain_params().with_amp(AdsrParams::new(0.001, 0.001, 1.0, 1.0)));
        pool.note_on(1, 69, 0.0, 0.5, 1);
        pool.note_on(2, 69, 0.0, 1.0, 1);
        run(&mut pool, 2000);
        pool.note_off(2);
        // Slot 1 releases below slot 0's sustained 0.5
        run(&mut pool, 24000);
        assert_eq!(pool.slot(1).map(|v| v.state()), Some(VoiceState::Release));

        pool.note_on(3, 69, 0.0, 1.0, 1);
        assert_eq!(ids(&pool), vec![1, 3]);
    }

    #[test]
    fn test_note_off_releases_bound_slots() {
        let mut pool = pool(4, Dc);
        pool.note_on(7, 60, 0.0, 1.0, 2);
        assert_eq!(pool.count_in(VoiceState::Active), 2);
        pool.note_off(7);
        assert_eq!(pool.count_in(VoiceState::Release), 2);
        assert_eq!(pool.count_in(VoiceState::Active), 0);
    }

    #[test]
    fn test_unknown_note_off_leaves_pool_unchanged() {
        let mut pool = pool(4, Dc);
        pool.note_on(1, 60, 0.0, 1.0, 1);
        pool.note_on(2, 64, 0.0, 1.0, 1);
        run(&mut pool, 50);

        let snapshot = |p: &VoicePool<Dc>| {
            p.slots()
                .iter()
                .map(|v| (v.state(), v.id(), v.age(), v.amp_stage(), v.current_gain().to_bits()))
                .collect::<Vec<_>>()
        };
        let before = snapshot(&pool);
        pool.note_off(99);
        assert_eq!(snapshot(&pool), before);
    }

    #[test]
    fn test_natural_death_frees_slot() {
        let mut pool = pool(2, Dc);
        pool.set_params(&plain_params());
        pool.note_on(1, 69, 0.0, 1.0, 1);
        run(&mut pool, 1000);
        pool.note_off(1);
        run(&mut pool, 48000);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(ids(&pool), vec![-1, -1]);
        assert!(!pool.mixer().is_pending());
    }

    #[test]
    fn test_unison_spreads_pitch_and_pan() {
        let mut pool = pool(8, Dc);
        let mut unison = UnisonConfig::new(3, 20.0);
        unison.stereo_spread = 1.0;
        pool.set_params(&plain_params().with_unison(unison));

        pool.note_on(1, 60, 0.0, 1.0, 3);
        assert_eq!(pool.active_count(), 3);
        let pitches: Vec<f64> = pool.slots()[..3].iter().map(|v| v.pitch()).collect();
        assert!((pitches[0] - 59.8).abs() < 1e-9);
        assert!((pitches[1] - 60.0).abs() < 1e-9);
        assert!((pitches[2] - 60.2).abs() < 1e-9);

        let pans: Vec<f64> = pool.slots()[..3].iter().map(|v| v.pan()).collect();
        assert_eq!(pans, vec![-1.0, 0.0, 1.0]);

        // The next note rotates which unison index lands on which side.
        pool.note_on(2, 64, 0.0, 1.0, 3);
        let pans: Vec<f64> = pool.slots()[3..6].iter().map(|v| v.pan()).collect();
        assert_eq!(pans, vec![0.0, 1.0, -1.0]);
    }

    #[test]
    fn test_velocity_curve_sets_voice_level() {
        let mut pool = pool(4, Dc);
        pool.note_on(1, 60, 0.0, 0.5, 1);
        assert_eq!(pool.slot(0).map(|v| v.velocity()), Some(0.5));

        let curve = VelocityCurve::Decibel { min_db: -60.0 };
        pool.set_params(&plain_params().with_velocity_curve(curve));
        pool.note_on(2, 62, 0.0, 0.5, 1);
        pool.note_on(3, 64, 0.0, 0.0, 1);
        let level = pool.slot(1).map(|v| v.velocity()).unwrap_or_default();
        assert!((level - curve.map(0.5)).abs() < 1e-12);
        assert!(level < 0.05);
        assert_eq!(pool.slot(2).map(|v| v.velocity()), Some(0.0));

        // Sounding notes keep the level they started with.
        assert_eq!(pool.slot(0).map(|v| v.velocity()), Some(0.5));
    }

    #[test]
    fn test_unison_count_clamped_to_pool() {
        let mut pool = pool(2, Dc);
        pool.note_on(1, 60, 0.0, 1.0, 16);
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn test_sounding_slots_never_exceed_pool() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut pool = pool(6, Tone::from_kind(ToneKind::Saw));
        pool.set_params(&plain_params().with_amp_curve(EnvelopeCurve::Linear));

        for _ in 0..400 {
            let id = rng.gen_range(0..20);
            if rng.gen_bool(0.6) {
                let unison = rng.gen_range(1..4);
                pool.note_on(id, rng.gen_range(36..96), 0.0, rng.gen::<f64>(), unison);
            } else {
                pool.note_off(id);
            }
            for _ in 0..rng.gen_range(0..64) {
                let [l, r] = pool.process_frame();
                assert!(l.is_finite() && r.is_finite());
            }
            assert!(pool.active_count() <= pool.num_voices());
        }
    }

    #[test]
    fn test_non_finite_voice_is_recovered() {
        let mut pool = pool(4, Unstable);
        pool.set_params(&plain_params());
        pool.note_on(1, 69, 0.0, 1.0, 1);
        pool.note_on(2, 81, 0.0, 1.0, 1);
        for _ in 0..100 {
            let [l, r] = pool.process_frame();
            assert!(l.is_finite() && r.is_finite());
        }
        assert_eq!(pool.recovered_voices(), 1);
        assert_eq!(ids(&pool), vec![1, -1, -1, -1]);
    }

    #[test]
    fn test_panic_silences_everything() {
        let mut pool = pool(2, Dc);
        pool.set_params(&plain_params());
        pool.note_on(1, 69, 0.0, 1.0, 1);
        pool.note_on(2, 69, 0.0, 1.0, 1);
        run(&mut pool, 500);
        pool.note_on(3, 69, 0.0, 1.0, 1);
        assert!(pool.mixer().is_pending());

        pool.panic();
        assert_eq!(pool.active_count(), 0);
        assert!(!pool.mixer().is_pending());
        assert_eq!(pool.process_frame(), [0.0, 0.0]);
    }

    #[test]
    fn test_all_notes_off_releases_everything() {
        let mut pool = pool(4, Dc);
        pool.note_on(1, 60, 0.0, 1.0, 1);
        pool.note_on(2, 62, 0.0, 1.0, 1);
        pool.all_notes_off();
        assert_eq!(pool.count_in(VoiceState::Release), 2);
    }

    #[test]
    fn test_master_gain_is_smoothed() {
        let mut pool = pool(1, Dc);
        pool.set_params(&plain_params());
        pool.note_on(1, 69, 0.0, 1.0, 1);
        run(&mut pool, 2000);
        let before = pool.process_frame()[0];

        pool.set_params(&plain_params().with_master_gain(0.0));
        let next = pool.process_frame()[0];
        assert!(next > 0.0 && next < before);
        run(&mut pool, 1000);
        assert_eq!(pool.process_frame(), [0.0, 0.0]);
    }
}
