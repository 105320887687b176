//! Shared drivers for recording scenarios.

use vcrop_capture::{BufferSource, FixedMask};
use vcrop_core::{PipelineConfig, PixelBuffer, Rect};
use vcrop_encode::testing::{Faults, MemoryPlatform};
use vcrop_pipeline::{PipelineController, PipelinePhase, PipelineResult, RecordingOutput};

pub type Controller = PipelineController<MemoryPlatform, BufferSource, FixedMask>;

/// Small output so scenarios stay cheap; everything else at defaults.
pub fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.output.width = 16;
    config.output.height = 28;
    config.countdown_ms = 100;
    config
}

/// A 160x90 landscape player with a 9:16 mask over its middle.
pub fn controller(config: PipelineConfig, faults: Faults, duration_ms: f64) -> Controller {
    let source = BufferSource::new(PixelBuffer::test_pattern(160, 90), duration_ms);
    let mask = FixedMask {
        mask: Rect::new(55.0, 0.0, 50.625, 90.0),
        video: Rect::new(0.0, 0.0, 160.0, 90.0),
    };
    PipelineController::new(config, MemoryPlatform::new(faults), source, mask).unwrap()
}

/// Drives the controller with one tick per display frame.
pub struct Driver {
    pub now_ms: f64,
    pub step_ms: f64,
}

impl Driver {
    pub fn new(display_fps: f64) -> Self {
        Self {
            now_ms: 0.0,
            step_ms: 1000.0 / display_fps,
        }
    }

    pub fn start(&mut self, c: &mut Controller) -> PipelineResult<()> {
        c.start(self.now_ms)
    }

    pub async fn count_down(&mut self, c: &mut Controller) -> PipelineResult<()> {
        while c.phase() == PipelinePhase::Countdown {
            self.now_ms += self.step_ms;
            c.tick(self.now_ms).await?;
        }
        Ok(())
    }

    /// One display frame with playback moving in lock-step.
    pub async fn frame(&mut self, c: &mut Controller) -> PipelineResult<PipelinePhase> {
        self.now_ms += self.step_ms;
        c.source_mut().advance(self.step_ms);
        c.tick(self.now_ms).await
    }

    pub async fn frames(&mut self, c: &mut Controller, n: usize) -> PipelineResult<()> {
        for _ in 0..n {
            self.frame(c).await?;
        }
        Ok(())
    }

    pub async fn play_to_end(&mut self, c: &mut Controller) -> PipelineResult<()> {
        while !c.source().is_ended() && c.phase() == PipelinePhase::Recording {
            self.frame(c).await?;
        }
        Ok(())
    }

    /// Start, count down, play the whole source and finish.
    pub async fn record(&mut self, c: &mut Controller) -> PipelineResult<RecordingOutput> {
        self.start(c)?;
        self.count_down(c).await?;
        self.play_to_end(c).await?;
        c.on_ended().await
    }
}
