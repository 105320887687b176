//! FIFO of captured frames waiting for a resampler pass.
//!
//! The queue is unbounded: the producer (sampler) is never blocked. Depth and
//! byte size are exposed so the controller can drain it proactively.

use crate::buffer_pool::BufferPool;
use std::collections::VecDeque;
use vcrop_core::CapturedFrame;

/// Unbounded-but-monitored queue of un-encoded frames.
#[derive(Default)]
pub struct CaptureQueue {
    frames: VecDeque<CapturedFrame>,
    bytes: usize,
    high_water: usize,
    total_pushed: u64,
}

impl CaptureQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame. Timestamps are expected to be non-decreasing.
    pub fn push(&mut self, frame: CapturedFrame) {
        debug_assert!(
            self.frames
                .back()
                .map_or(true, |last| last.timestamp_ms <= frame.timestamp_ms),
            "captured frames must arrive in timestamp order"
        );
        self.bytes += frame.buffer.memory_size();
        self.frames.push_back(frame);
        self.total_pushed += 1;
        self.high_water = self.high_water.max(self.frames.len());
    }

    /// Remove up to `max` frames from the front.
    pub fn take_chunk(&mut self, max: usize) -> Vec<CapturedFrame> {
        let n = max.min(self.frames.len());
        let chunk: Vec<CapturedFrame> = self.frames.drain(..n).collect();
        self.bytes -= chunk.iter().map(|f| f.buffer.memory_size()).sum::<usize>();
        chunk
    }

    /// Current depth.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Bytes of pixel data held by queued frames.
    pub fn memory_bytes(&self) -> usize {
        self.bytes
    }

    /// Deepest the queue has been since creation or the last clear.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Frames pushed since creation or the last clear.
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Timestamp of the oldest queued frame.
    pub fn front_timestamp_ms(&self) -> Option<f64> {
        self.frames.front().map(|f| f.timestamp_ms)
    }

    /// Discard every queued frame, returning buffers to `pool`.
    pub fn drain_into(&mut self, pool: &mut BufferPool) -> usize {
        let n = self.frames.len();
        for frame in self.frames.drain(..) {
            pool.release(frame.into_buffer());
        }
        self.bytes = 0;
        n
    }

    /// Discard every queued frame and reset statistics.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.bytes = 0;
        self.high_water = 0;
        self.total_pushed = 0;
    }
}
