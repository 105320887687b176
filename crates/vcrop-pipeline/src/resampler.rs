//! Irregular capture timestamps to a uniform output timeline.
//!
//! Each pass appends a chunk of captured frames to a small working window and
//! plans output slots `i = next_index..` with target time
//! `start + i / output_fps`. Each slot takes the captured frame nearest its
//! target (earliest wins a tie). Targets only grow, so the nearest frame is
//! tracked with a cursor that never moves backwards.
//!
//! A slot that would repeat the previous slot's frame is skipped (its index is
//! still consumed) except near the end of the recording, where duplicates are
//! kept so the output reaches the true end. Frames that were skipped over
//! without being picked are appended after the pass as extra slots; frames
//! past the final target are not.

use vcrop_capture::BufferPool;
use vcrop_core::{CapturedFrame, FrameId, FrameRate, Timestamp};

/// How far a pass may plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    /// More frames will follow: plan only targets at or before the newest
    /// frame, whose nearest frame can no longer change.
    Chunk,
    /// Capture has ended: plan every target up to the end of the recording.
    End,
}

/// Why a slot was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Nearest frame, different from the previous slot's.
    Nearest,
    /// Nearest frame repeated inside the tail of the recording.
    Duplicate,
    /// A frame no target picked, appended after the pass.
    Extra,
}

/// One planned output frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputFrameSlot {
    /// Output index, 0-based.
    pub index: u64,
    /// Presentation time relative to the recording start.
    pub target: Timestamp,
    /// Chosen captured frame.
    pub frame: FrameId,
    /// Capture timestamp of the chosen frame.
    pub source_ms: f64,
    pub kind: SlotKind,
    /// Position of the frame in the resampler window.
    position: usize,
}

/// Planning counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResamplerStats {
    pub passes: u64,
    pub nearest: u64,
    pub duplicates_emitted: u64,
    pub duplicates_skipped: u64,
    pub extras: u64,
    /// Frames captured after the last output target, never encoded.
    pub trailing: u64,
}

impl ResamplerStats {
    pub fn slots(&self) -> u64 {
        self.nearest + self.duplicates_emitted + self.extras
    }
}

struct Candidate {
    frame: CapturedFrame,
    selected: bool,
}

pub struct Resampler {
    rate: FrameRate,
    tail_fraction: f64,
    start_ms: Option<f64>,
    end_ms: Option<f64>,
    next_index: u64,
    window: Vec<Candidate>,
    cursor: usize,
    last_selected: Option<FrameId>,
    stats: ResamplerStats,
}

impl Resampler {
    pub fn new(rate: FrameRate, tail_fraction: f64) -> Self {
        Self {
            rate,
            tail_fraction,
            start_ms: None,
            end_ms: None,
            next_index: 0,
            window: Vec::new(),
            cursor: 0,
            last_selected: None,
            stats: ResamplerStats::default(),
        }
    }

    /// Source time of output index 0. Defaults to the first frame's timestamp.
    pub fn start_at(&mut self, start_ms: f64) {
        self.start_ms = Some(start_ms);
    }

    /// Source time at which the recording ends, if known in advance.
    pub fn set_end_ms(&mut self, end_ms: Option<f64>) {
        self.end_ms = end_ms;
    }

    pub fn start_ms(&self) -> Option<f64> {
        self.start_ms
    }

    pub fn end_ms(&self) -> Option<f64> {
        self.end_ms
    }

    /// The next output index to be planned.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn stats(&self) -> ResamplerStats {
        self.stats
    }

    /// Frames held back for later passes.
    pub fn retained(&self) -> usize {
        self.window.len()
    }

    /// Bytes of pixel data held back for later passes.
    pub fn retained_bytes(&self) -> usize {
        self.window.iter().map(|c| c.frame.buffer.memory_size()).sum()
    }

    /// Recording duration used for the tail policy, if it can be known.
    pub fn duration_ms(&self) -> Option<f64> {
        Some(self.end_ms? - self.start_ms?)
    }

    fn target_ms(&self, start_ms: f64, index: u64) -> f64 {
        start_ms + index as f64 * 1000.0 * self.rate.denominator as f64 / self.rate.numerator as f64
    }

    fn distance(&self, position: usize, target_ms: f64) -> f64 {
        (self.window[position].frame.timestamp_ms - target_ms).abs()
    }

    /// Plan output slots for `chunk` plus any frames kept from earlier passes.
    pub fn plan(&mut self, chunk: Vec<CapturedFrame>, horizon: Horizon) -> Vec<OutputFrameSlot> {
        self.window.extend(chunk.into_iter().map(|frame| Candidate { frame, selected: false }));
        let Some(last_ms) = self.window.last().map(|c| c.frame.timestamp_ms) else {
            return Vec::new();
        };
        let start_ms = *self
            .start_ms
            .get_or_insert(self.window[0].frame.timestamp_ms);

        let tail_total = match horizon {
            Horizon::Chunk => self.end_ms.map(|end| end - start_ms),
            Horizon::End => Some(self.end_ms.unwrap_or(last_ms) - start_ms),
        };

        let mut slots = Vec::new();
        loop {
            let target_ms = self.target_ms(start_ms, self.next_index);
            let within = match horizon {
                Horizon::Chunk => target_ms <= last_ms && self.end_ms.map_or(true, |end| target_ms < end),
                Horizon::End => match self.end_ms {
                    Some(end) => target_ms < end,
                    None => target_ms <= last_ms,
                },
            };
            if !within {
                break;
            }

            while self.cursor + 1 < self.window.len()
                && self.distance(self.cursor + 1, target_ms) < self.distance(self.cursor, target_ms)
            {
                self.cursor += 1;
            }

            let index = self.next_index;
            self.next_index += 1;

            let id = self.window[self.cursor].frame.id;
            let duplicate = self.last_selected == Some(id);
            if duplicate {
                let in_tail = tail_total.map_or(false, |total| {
                    target_ms - start_ms >= (1.0 - self.tail_fraction) * total
                }) || (horizon == Horizon::End && target_ms > last_ms);
                if !in_tail {
                    self.stats.duplicates_skipped += 1;
                    continue;
                }
                self.stats.duplicates_emitted += 1;
            } else {
                self.stats.nearest += 1;
            }

            let kind = if duplicate { SlotKind::Duplicate } else { SlotKind::Nearest };
            slots.push(self.slot(index, self.cursor, kind));
            self.window[self.cursor].selected = true;
            self.last_selected = Some(id);
        }

        // Unpicked frames behind the cursor can no longer be chosen.
        for position in 0..self.cursor {
            if !self.window[position].selected {
                let index = self.next_index;
                self.next_index += 1;
                slots.push(self.slot(index, position, SlotKind::Extra));
                self.window[position].selected = true;
                self.last_selected = Some(self.window[position].frame.id);
                self.stats.extras += 1;
            }
        }

        if horizon == Horizon::End {
            let trailing = self.window[self.cursor..].iter().filter(|c| !c.selected).count();
            self.stats.trailing += trailing as u64;
        }

        self.stats.passes += 1;
        slots
    }

    fn slot(&self, index: u64, position: usize, kind: SlotKind) -> OutputFrameSlot {
        let frame = &self.window[position].frame;
        OutputFrameSlot {
            index,
            target: self.rate.frame_time(index),
            frame: frame.id,
            source_ms: frame.timestamp_ms,
            kind,
            position,
        }
    }

    /// The captured frame a slot refers to. Valid until the next `retire`.
    pub fn frame(&self, slot: &OutputFrameSlot) -> Option<&CapturedFrame> {
        self.window
            .get(slot.position)
            .map(|c| &c.frame)
            .filter(|f| f.id == slot.frame)
    }

    /// Return frames that later passes can no longer use to the pool.
    pub fn retire(&mut self, pool: &mut BufferPool) -> usize {
        let n = self.cursor;
        for candidate in self.window.drain(..n) {
            pool.release(candidate.frame.into_buffer());
        }
        self.cursor = 0;
        n
    }

    /// Return every held frame to the pool.
    pub fn retire_all(&mut self, pool: &mut BufferPool) -> usize {
        let n = self.window.len();
        for candidate in self.window.drain(..) {
            pool.release(candidate.frame.into_buffer());
        }
        self.cursor = 0;
        n
    }

    /// Forget the timeline for a new recording attempt.
    pub fn reset(&mut self, pool: &mut BufferPool) {
        self.retire_all(pool);
        self.start_ms = None;
        self.end_ms = None;
        self.next_index = 0;
        self.last_selected = None;
        self.stats = ResamplerStats::default();
    }
}
