//! Steal crossfade buffer
//!
//! When a sounding slot is stolen, its next `W` samples are rendered at once
//! and added into a ring buffer under a linear taper falling from 1 to 0.
//! The ring is then read back one frame per output sample, each slot zeroed
//! as it is consumed, so the stolen note fades out instead of stopping dead.
//!
//! The ring holds `W + 1` frames so a capture never overlaps the slot the
//! read cursor is about to consume.

/// Ring buffer of tapered stereo frames
#[derive(Debug, Clone)]
pub struct TransitionMixer {
    ring: Vec<[f64; 2]>,
    cursor: usize,
    /// Frames until every written slot has been consumed
    pending: usize,
}

impl TransitionMixer {
    /// Allocate a ring of `len` frames (at least one). Not real-time safe.
    pub fn new(len: usize) -> Self {
        Self {
            ring: vec![[0.0; 2]; len.max(1)],
            cursor: 0,
            pending: 0,
        }
    }

    /// Number of frames a capture spans
    pub fn window(&self) -> usize {
        self.ring.len() - 1
    }

    /// True while captured frames are still waiting to be mixed
    pub fn is_pending(&self) -> bool {
        self.pending > 0
    }

    /// Render `window()` frames from `render` and add them, tapered, into
    /// the ring starting at the read cursor.
    ///
    /// Frame `i` is weighted by `1 - i / window()`, so the first captured
    /// frame is mixed at full level on the very next read.
    pub fn capture<F>(&mut self, mut render: F)
    where
        F: FnMut() -> [f64; 2],
    {
        let window = self.window();
        if window == 0 {
            return;
        }

        let len = self.ring.len();
        let scale = 1.0 / window as f64;
        for i in 0..window {
            let [l, r] = render();
            let weight = 1.0 - i as f64 * scale;
            let slot = &mut self.ring[(self.cursor + i) % len];
            slot[0] += l * weight;
            slot[1] += r * weight;
        }
        self.pending = self.pending.max(window);
    }

    /// Consume the frame under the cursor and advance
    #[inline]
    pub fn process(&mut self) -> [f64; 2] {
        if self.pending == 0 {
            return [0.0, 0.0];
        }
        let frame = core::mem::take(&mut self.ring[self.cursor]);
        self.cursor = (self.cursor + 1) % self.ring.len();
        self.pending -= 1;
        frame
    }

    /// Drop everything captured so far
    pub fn clear(&mut self) {
        self.ring.fill([0.0; 2]);
        self.cursor = 0;
        self.pending = 0;
    }
}
