//! Capability interfaces supplied by the playback environment, plus an
//! in-memory implementation used by the demo binary and tests.

use crate::error::{CaptureError, CaptureResult};
use vcrop_core::{PixelBuffer, Rect, SourceRect};

/// Access to the frame currently rendered by the video player.
pub trait PixelSource {
    /// Intrinsic pixel size of the rendered frame, `None` until one is decoded.
    fn intrinsic_size(&self) -> Option<(u32, u32)>;

    /// Current playback position in milliseconds.
    fn current_time_ms(&self) -> f64;

    /// Draw `region` of the rendered frame, scaled to fill `target`.
    fn draw_region(&mut self, region: SourceRect, target: &mut PixelBuffer) -> CaptureResult<()>;
}

/// On-screen geometry of the crop viewport and of the rendered video.
pub trait MaskGeometry {
    fn mask_rect(&self) -> Rect;
    fn video_rect(&self) -> Rect;
}

/// Playback commands issued by the pipeline controller.
pub trait PlaybackControl {
    fn play(&mut self);
    fn pause(&mut self);
    fn seek_to_start(&mut self);
    /// Total source duration, if known.
    fn duration_ms(&self) -> Option<f64>;
}

/// Mask geometry that does not move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedMask {
    pub mask: Rect,
    pub video: Rect,
}

impl MaskGeometry for FixedMask {
    fn mask_rect(&self) -> Rect {
        self.mask
    }

    fn video_rect(&self) -> Rect {
        self.video
    }
}

/// A player showing one in-memory RGBA frame on a virtual clock.
///
/// The clock only moves when [`BufferSource::advance`] is called while
/// playing, which makes capture runs reproducible.
pub struct BufferSource {
    frame: Option<PixelBuffer>,
    position_ms: f64,
    duration_ms: f64,
    duration_known: bool,
    playing: bool,
}

impl BufferSource {
    pub fn new(frame: PixelBuffer, duration_ms: f64) -> Self {
        Self {
            frame: Some(frame),
            position_ms: 0.0,
            duration_ms,
            duration_known: true,
            playing: false,
        }
    }

    /// Stop reporting the duration, as a stream without a known length
    /// does. Playback still ends at `duration_ms`.
    pub fn with_unknown_duration(mut self) -> Self {
        self.duration_known = false;
        self
    }

    /// Replace the displayed frame.
    pub fn set_frame(&mut self, frame: PixelBuffer) {
        self.frame = Some(frame);
    }

    /// Detach the frame, as when the media element is unloaded.
    pub fn detach(&mut self) {
        self.frame = None;
    }

    /// Mutable access to the displayed frame for in-place animation.
    pub fn frame_mut(&mut self) -> Option<&mut PixelBuffer> {
        self.frame.as_mut()
    }

    /// Move the playback clock forward by `dt_ms` if playing.
    pub fn advance(&mut self, dt_ms: f64) {
        if self.playing {
            self.position_ms = (self.position_ms + dt_ms).min(self.duration_ms);
            if self.position_ms >= self.duration_ms {
                self.playing = false;
            }
        }
    }

    /// Jump to an absolute position.
    pub fn set_position(&mut self, position_ms: f64) {
        self.position_ms = position_ms.clamp(0.0, self.duration_ms);
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Playback reached the end of the source.
    pub fn is_ended(&self) -> bool {
        self.position_ms >= self.duration_ms
    }
}

impl PixelSource for BufferSource {
    fn intrinsic_size(&self) -> Option<(u32, u32)> {
        self.frame.as_ref().map(PixelBuffer::dimensions)
    }

    fn current_time_ms(&self) -> f64 {
        self.position_ms
    }

    fn draw_region(&mut self, region: SourceRect, target: &mut PixelBuffer) -> CaptureResult<()> {
        let frame = self.frame.as_ref().ok_or(CaptureError::Detached)?;
        scale_nearest(frame, region, target)
    }
}

impl PlaybackControl for BufferSource {
    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn seek_to_start(&mut self) {
        self.position_ms = 0.0;
    }

    fn duration_ms(&self) -> Option<f64> {
        self.duration_known.then_some(self.duration_ms)
    }
}

/// Nearest-neighbour scale of `region` of `src` into the whole of `dst`.
pub fn scale_nearest(src: &PixelBuffer, region: SourceRect, dst: &mut PixelBuffer) -> CaptureResult<()> {
    if region.width == 0
        || region.height == 0
        || region.x + region.width > src.width()
        || region.y + region.height > src.height()
    {
        return Err(CaptureError::Geometry(format!(
            "region {:?} outside {}x{} source",
            region,
            src.width(),
            src.height()
        )));
    }

    let (dw, dh) = dst.dimensions();
    for y in 0..dh {
        let sy = region.y + (y as u64 * region.height as u64 / dh as u64) as u32;
        let src_row = src.row(sy);
        let dst_row = dst.row_mut(y);
        for x in 0..dw {
            let sx = region.x as usize + (x as u64 * region.width as u64 / dw as u64) as usize;
            let s = sx * 4;
            let d = x as usize * 4;
            dst_row[d..d + 4].copy_from_slice(&src_row[s..s + 4]);
        }
    }
    Ok(())
}
