//! Per-tick frame sampling.
//!
//! Called once per display tick. Accepts at most one sample per capture
//! interval, guards against the playback clock reporting the same position on
//! consecutive ticks, maps the mask onto source pixels and draws the masked
//! region into a pooled output-resolution buffer.

use crate::buffer_pool::BufferPool;
use crate::error::CaptureError;
use crate::queue::CaptureQueue;
use crate::source::{MaskGeometry, PixelSource};
use tracing::{trace, warn};
use vcrop_core::{CapturedFrame, FrameId, PipelineConfig, SourceRect};

/// Float slack when comparing tick spacing against the capture interval.
const INTERVAL_EPSILON_MS: f64 = 1e-3;

/// Sampler settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerConfig {
    /// Minimum time between accepted samples.
    pub capture_interval_ms: f64,
    /// Output surface width.
    pub target_width: u32,
    /// Output surface height.
    pub target_height: u32,
}

impl SamplerConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            capture_interval_ms: config.capture_interval_ms(),
            target_width: config.output.width,
            target_height: config.output.height,
        }
    }
}

/// What happened on one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// A frame was appended to the queue.
    Captured(FrameId),
    /// Less than one capture interval since the last accepted sample.
    TooSoon,
    /// Playback reported the same position as the last accepted sample.
    Duplicate,
    /// Playback reported a position before the last accepted sample.
    OutOfOrder,
    /// Drawing failed; the tick was skipped.
    Skipped(String),
}

/// Tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub accepted: u64,
    pub too_soon: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
    pub failures: u64,
}

pub struct FrameSampler {
    config: SamplerConfig,
    last_accept_ms: Option<f64>,
    last_timestamp_ms: Option<f64>,
    next_id: u64,
    stats: SamplerStats,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            last_accept_ms: None,
            last_timestamp_ms: None,
            next_id: 0,
            stats: SamplerStats::default(),
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Timestamp of the last accepted sample.
    pub fn last_timestamp_ms(&self) -> Option<f64> {
        self.last_timestamp_ms
    }

    /// Forget all state for a new recording attempt.
    pub fn reset(&mut self) {
        self.last_accept_ms = None;
        self.last_timestamp_ms = None;
        self.next_id = 0;
        self.stats = SamplerStats::default();
    }

    /// Run one tick at wall-clock time `now_ms`.
    pub fn sample<S, M>(
        &mut self,
        now_ms: f64,
        source: &mut S,
        mask: &M,
        pool: &mut BufferPool,
        queue: &mut CaptureQueue,
    ) -> SampleOutcome
    where
        S: PixelSource + ?Sized,
        M: MaskGeometry + ?Sized,
    {
        if let Some(last) = self.last_accept_ms {
            if now_ms - last < self.config.capture_interval_ms - INTERVAL_EPSILON_MS {
                self.stats.too_soon += 1;
                return SampleOutcome::TooSoon;
            }
        }

        let timestamp_ms = source.current_time_ms();
        if let Some(prev) = self.last_timestamp_ms {
            if timestamp_ms == prev {
                self.stats.duplicates += 1;
                trace!(timestamp_ms, "Playback clock did not move, skipping sample");
                return SampleOutcome::Duplicate;
            }
            if timestamp_ms < prev {
                self.stats.out_of_order += 1;
                warn!(timestamp_ms, prev, "Playback clock went backwards, skipping sample");
                return SampleOutcome::OutOfOrder;
            }
        }

        let mut buffer = pool.acquire(self.config.target_width, self.config.target_height);
        let drawn = Self::region(source, mask).and_then(|region| source.draw_region(region, &mut buffer));
        if let Err(e) = drawn {
            pool.release(buffer);
            self.stats.failures += 1;
            warn!(error = %e, timestamp_ms, "Frame capture failed, skipping tick");
            return SampleOutcome::Skipped(e.to_string());
        }

        let id = FrameId(self.next_id);
        self.next_id += 1;
        queue.push(CapturedFrame::new(id, buffer, timestamp_ms));

        self.last_accept_ms = Some(now_ms);
        self.last_timestamp_ms = Some(timestamp_ms);
        self.stats.accepted += 1;
        SampleOutcome::Captured(id)
    }

    fn region<S, M>(source: &S, mask: &M) -> Result<SourceRect, CaptureError>
    where
        S: PixelSource + ?Sized,
        M: MaskGeometry + ?Sized,
    {
        let (sw, sh) = source.intrinsic_size().ok_or(CaptureError::Detached)?;
        let mask_rect = mask.mask_rect();
        let video_rect = mask.video_rect();
        SourceRect::from_mask(mask_rect, video_rect, sw, sh).ok_or_else(|| {
            CaptureError::Geometry(format!(
                "mask {:?} does not map onto video {:?} ({}x{})",
                mask_rect, video_rect, sw, sh
            ))
        })
    }
}
