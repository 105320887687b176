//! Integration tests for the capture side: sampler, pool and queue
//! working against a player.

use vcrop_capture::{
    BufferPool, BufferSource, CaptureQueue, FixedMask, FrameSampler, PlaybackControl, SampleOutcome,
    SamplerConfig,
};
use vcrop_core::{PipelineConfig, PixelBuffer, Rect};

// ── Helpers ────────────────────────────────────────────────────

struct Rig {
    source: BufferSource,
    mask: FixedMask,
    pool: BufferPool,
    queue: CaptureQueue,
    sampler: FrameSampler,
}

fn rig(capture_fps: f64) -> Rig {
    let mut config = PipelineConfig::default();
    config.output.width = 16;
    config.output.height = 28;
    config.capture_fps = capture_fps;

    let mut source = BufferSource::new(PixelBuffer::test_pattern(160, 90), 60_000.0);
    source.play();
    Rig {
        source,
        mask: FixedMask {
            mask: Rect::new(55.0, 0.0, 50.625, 90.0),
            video: Rect::new(0.0, 0.0, 160.0, 90.0),
        },
        pool: BufferPool::new(config.pool_capacity),
        queue: CaptureQueue::new(),
        sampler: FrameSampler::new(SamplerConfig::from_pipeline(&config)),
    }
}

impl Rig {
    fn sample(&mut self, now_ms: f64) -> SampleOutcome {
        self.sampler
            .sample(now_ms, &mut self.source, &self.mask, &mut self.pool, &mut self.queue)
    }
}

// ── Sampling against a display loop ────────────────────────────

#[test]
fn display_faster_than_capture_rate_is_thinned() {
    let mut rig = rig(30.0);
    let step = 1000.0 / 60.0;
    let mut now = 0.0;
    for _ in 0..120 {
        rig.sample(now);
        now += step;
        rig.source.advance(step);
    }
    // Two seconds at 60 Hz, gated to 30 fps.
    assert_eq!(rig.queue.len(), 60);
    assert_eq!(rig.queue.total_pushed(), 60);
}

#[test]
fn queued_frames_have_output_dimensions() {
    let mut rig = rig(30.0);
    rig.sample(0.0);
    let frames = rig.queue.take_chunk(1);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].buffer.dimensions(), (16, 28));
}

#[test]
fn paused_player_yields_duplicates() {
    let mut rig = rig(30.0);
    assert!(matches!(rig.sample(0.0), SampleOutcome::Captured(_)));
    rig.source.pause();
    rig.source.advance(100.0);
    assert_eq!(rig.sample(100.0), SampleOutcome::Duplicate);
    assert_eq!(rig.queue.len(), 1);
}

#[test]
fn detached_media_is_skipped_and_recovers() {
    let mut rig = rig(30.0);
    rig.source.detach();
    assert!(matches!(rig.sample(0.0), SampleOutcome::Skipped(_)));
    assert_eq!(rig.sampler.stats().failures, 1);
    assert!(rig.queue.is_empty());

    rig.source.set_frame(PixelBuffer::test_pattern(160, 90));
    rig.source.advance(40.0);
    assert!(matches!(rig.sample(40.0), SampleOutcome::Captured(_)));
}

#[test]
fn draining_queue_feeds_the_pool() {
    let mut rig = rig(30.0);
    let step = 1000.0 / 30.0;
    for i in 0..10 {
        rig.source.advance(if i == 0 { 0.0 } else { step });
        rig.sample(i as f64 * step);
    }
    assert_eq!(rig.queue.len(), 10);
    assert_eq!(rig.pool.len(), 0);

    rig.queue.drain_into(&mut rig.pool);
    assert!(rig.queue.is_empty());
    assert_eq!(rig.pool.len(), 10);

    // Reused buffers mean no new allocations for the next captures.
    let before = rig.pool.stats();
    rig.source.advance(step);
    rig.sample(10.0 * step);
    assert_eq!(rig.pool.stats().reused, before.reused + 1);
}
