//! Pixel buffers and captured frames.
//!
//! All capture surfaces are tightly packed RGBA8 so a buffer can be handed to
//! an encoder without repacking. Buffers are plain owned values: moving a
//! [`CapturedFrame`] moves its pixels, which is what keeps every buffer owned
//! by exactly one pipeline stage at a time.

use serde::{Deserialize, Serialize};

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Monotonic identifier assigned by the sampler to each captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u64);

/// A tightly packed RGBA8 pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer with the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; Self::byte_len(width, height)],
        }
    }

    /// Wrap existing RGBA8 bytes. Returns `None` if the length does not match.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != Self::byte_len(width, height) {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Bytes needed for a `width` x `height` RGBA8 frame.
    #[inline]
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)` pair, used as the pool key.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Total memory usage of this buffer in bytes.
    #[inline]
    pub fn memory_size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride();
        &self.data[start..start + self.stride()]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    /// Read the pixel at `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Fill the whole buffer with one colour.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Create a test pattern frame (color bars).
    pub fn test_pattern(width: u32, height: u32) -> Self {
        const BARS: [[u8; 4]; 8] = [
            [255, 255, 255, 255], // White
            [255, 255, 0, 255],   // Yellow
            [0, 255, 255, 255],   // Cyan
            [0, 255, 0, 255],     // Green
            [255, 0, 255, 255],   // Magenta
            [255, 0, 0, 255],     // Red
            [0, 0, 255, 255],     // Blue
            [0, 0, 0, 255],       // Black
        ];

        let mut frame = Self::new(width, height);
        for y in 0..height {
            let row = frame.row_mut(y);
            for x in 0..width {
                let i = x as usize * BYTES_PER_PIXEL;
                let bar = (x as u64 * 8 / width.max(1) as u64) as usize;
                row[i..i + BYTES_PER_PIXEL].copy_from_slice(&BARS[bar.min(7)]);
            }
        }
        frame
    }
}

/// A masked frame captured during playback, waiting to be encoded.
///
/// Created by the sampler, owned by the capture queue until a resampler pass
/// takes it, and returned to the buffer pool once encoded or discarded.
#[derive(Debug)]
pub struct CapturedFrame {
    /// Capture order.
    pub id: FrameId,
    /// Masked pixels scaled to the output resolution.
    pub buffer: PixelBuffer,
    /// Playback position in milliseconds when the frame was sampled.
    pub timestamp_ms: f64,
}

impl CapturedFrame {
    pub fn new(id: FrameId, buffer: PixelBuffer, timestamp_ms: f64) -> Self {
        Self {
            id,
            buffer,
            timestamp_ms,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Give the pixel buffer back, e.g. to return it to the pool.
    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }
}
