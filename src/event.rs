//! Note events and the per-block event queue
//!
//! The host hands over a block's worth of timestamped note events. They are
//! buffered in an [`EventQueue`] whose storage is reserved up front, then
//! drained frame by frame so that each event takes effect exactly at its
//! sample offset, before that sample is rendered.

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Whether an event starts or releases a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteEventKind {
    NoteOn,
    NoteOff,
}

/// A timestamped note event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub kind: NoteEventKind,
    /// Sample offset inside the current block
    pub frame: u32,
    /// Host note id; note-off matches on this, not on pitch
    pub note_id: i32,
    /// Pitch in semitones (MIDI note numbers)
    pub pitch: i16,
    /// Fine tuning in cents
    pub tuning_cents: f64,
    /// Velocity in [0.0, 1.0]
    pub velocity: f64,
}

impl NoteEvent {
    pub fn note_on(frame: u32, note_id: i32, pitch: i16, velocity: f64) -> Self {
        Self {
            kind: NoteEventKind::NoteOn,
            frame,
            note_id,
            pitch,
            tuning_cents: 0.0,
            velocity: velocity.clamp(0.0, 1.0),
        }
    }

    pub fn note_off(frame: u32, note_id: i32) -> Self {
        Self {
            kind: NoteEventKind::NoteOff,
            frame,
            note_id,
            pitch: 0,
            tuning_cents: 0.0,
            velocity: 0.0,
        }
    }

    pub fn with_tuning(mut self, cents: f64) -> Self {
        self.tuning_cents = cents;
        self
    }

    pub fn is_note_on(&self) -> bool {
        self.kind == NoteEventKind::NoteOn
    }

    /// Pitch including fine tuning, in fractional semitones
    pub fn fractional_pitch(&self) -> f64 {
        self.pitch as f64 + self.tuning_cents / 100.0
    }
}

/// Fixed-capacity queue of note events for one block.
///
/// Pushing appends and never reallocates. Pending events are put in frame
/// order once, on the first drain after a push; events sharing a frame keep
/// their insertion order. Space is reclaimed when the queue runs empty.
#[derive(Debug)]
pub struct EventQueue {
    events: Vec<Queued>,
    head: usize,
    next_seq: u64,
    sorted: bool,
}

/// Queued event tagged with its arrival order
#[derive(Debug, Clone, Copy)]
struct Queued {
    seq: u64,
    event: NoteEvent,
}

impl EventQueue {
    /// Reserve room for `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            head: 0,
            next_seq: 0,
            sorted: true,
        }
    }

    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }

    /// Number of events not yet dispatched
    pub fn len(&self) -> usize {
        self.events.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue an event.
    ///
    /// Fails without side effects once the reserved capacity is used up.
    pub fn push(&mut self, event: NoteEvent) -> Result<(), QueueError> {
        if self.events.len() == self.events.capacity() {
            return Err(QueueError::Full {
                capacity: self.events.capacity(),
            });
        }

        if self.events.last().is_some_and(|q| q.event.frame > event.frame) {
            self.sorted = false;
        }
        self.events.push(Queued {
            seq: self.next_seq,
            event,
        });
        self.next_seq += 1;
        Ok(())
    }

    /// Dispatch, in order, every queued event due at or before `frame`.
    ///
    /// Must run before the sample at `frame` is rendered.
    pub fn drain_at<F>(&mut self, frame: u32, mut dispatch: F)
    where
        F: FnMut(&NoteEvent),
    {
        self.sort_pending();
        while let Some(queued) = self.events.get(self.head) {
            if queued.event.frame > frame {
                break;
            }
            dispatch(&queued.event);
            self.head += 1;
        }
        if self.head == self.events.len() {
            self.clear();
        }
    }

    /// Dispatch everything left, regardless of frame
    pub fn drain_all<F>(&mut self, mut dispatch: F)
    where
        F: FnMut(&NoteEvent),
    {
        self.sort_pending();
        for queued in &self.events[self.head..] {
            dispatch(&queued.event);
        }
        self.clear();
    }

    /// Frame of the next pending event
    pub fn next_frame(&self) -> Option<u32> {
        let pending = &self.events[self.head..];
        if self.sorted {
            pending.first().map(|q| q.event.frame)
        } else {
            pending.iter().map(|q| q.event.frame).min()
        }
    }

    /// Drop all pending events
    pub fn clear(&mut self) {
        self.events.clear();
        self.head = 0;
        self.next_seq = 0;
        self.sorted = true;
    }

    // In place; the sequence number keeps same-frame events in arrival order.
    fn sort_pending(&mut self) {
        if !self.sorted {
            self.events[self.head..].sort_unstable_by_key(|q| (q.event.frame, q.seq));
            self.sorted = true;
        }
    }
}
