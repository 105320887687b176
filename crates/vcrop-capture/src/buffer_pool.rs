//! Pixel buffer pool for capture surfaces.
//!
//! Avoids allocating a full output-resolution buffer per captured frame by
//! keeping released buffers keyed by (width, height). Lookups are exact: a
//! buffer is never resized to satisfy a request.

use std::collections::HashMap;
use tracing::trace;
use vcrop_core::PixelBuffer;

/// Counters describing pool effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Acquisitions served from the pool.
    pub reused: u64,
    /// Acquisitions that had to allocate.
    pub allocated: u64,
    /// Releases dropped because the pool was full.
    pub discarded: u64,
}

/// Pool of reusable RGBA buffers.
///
/// Buffers are moved in and out, so a buffer sitting in the pool is never
/// referenced by a frame in flight.
pub struct BufferPool {
    /// Available (free) buffers, keyed by dimensions.
    free: HashMap<(u32, u32), Vec<PixelBuffer>>,
    /// Number of free buffers across all keys.
    count: usize,
    /// Total memory held by free buffers.
    total_memory: usize,
    /// Maximum number of free buffers retained.
    capacity: usize,
    stats: PoolStats,
}

impl BufferPool {
    /// Create a new pool retaining at most `capacity` free buffers.
    pub fn new(capacity: usize) -> Self {
        Self {
            free: HashMap::new(),
            count: 0,
            total_memory: 0,
            capacity,
            stats: PoolStats::default(),
        }
    }

    /// Acquire a buffer of exactly `width` x `height`, reusing one if possible.
    ///
    /// The contents of a reused buffer are whatever the previous frame left.
    pub fn acquire(&mut self, width: u32, height: u32) -> PixelBuffer {
        if let Some(buffers) = self.free.get_mut(&(width, height)) {
            if let Some(buf) = buffers.pop() {
                self.count -= 1;
                self.total_memory -= buf.memory_size();
                self.stats.reused += 1;
                return buf;
            }
        }

        self.stats.allocated += 1;
        PixelBuffer::new(width, height)
    }

    /// Return a buffer to the pool for reuse.
    pub fn release(&mut self, buffer: PixelBuffer) {
        if self.count >= self.capacity {
            self.stats.discarded += 1;
            trace!(capacity = self.capacity, "Pool full, dropping buffer");
            return; // buffer is dropped
        }

        self.count += 1;
        self.total_memory += buffer.memory_size();
        self.free.entry(buffer.dimensions()).or_default().push(buffer);
    }

    /// Total memory used by pooled (free) buffers.
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Number of free buffers in the pool.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Drop all pooled buffers.
    pub fn clear(&mut self) {
        self.free.clear();
        self.count = 0;
        self.total_memory = 0;
    }
}
