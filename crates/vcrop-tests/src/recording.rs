//! End-to-end recordings against the in-memory codec platform.

use crate::harness::{controller, small_config, Driver};
use vcrop_core::Timestamp;
use vcrop_capture::PixelSource;
use vcrop_encode::testing::{Faults, MEMORY_CONTAINER_HEADER};
use vcrop_pipeline::{PipelineEvent, PipelinePhase};

fn assert_strictly_increasing(timestamps: &[Timestamp]) {
    for pair in timestamps.windows(2) {
        assert!(pair[1] > pair[0], "{:?} is not after {:?}", pair[1], pair[0]);
    }
}

// ── Output timeline ────────────────────────────────────────────

#[tokio::test]
async fn ten_seconds_at_24fps_fills_300_output_frames() {
    let mut config = small_config();
    config.capture_fps = 24.0;
    let mut c = controller(config, Faults::default(), 10_000.0);
    let mut driver = Driver::new(24.0);

    let output = driver.record(&mut c).await.unwrap();
    assert_eq!(c.phase(), PipelinePhase::Done);
    assert_eq!(output.output_frames, 300);
    assert_eq!(output.duration, Timestamp::from_micros(10_000_000));

    let log = c.platform().log();
    let submitted: Vec<Timestamp> = log.submissions.iter().map(|(ts, _)| *ts).collect();
    assert_strictly_increasing(&submitted);
    assert_eq!(submitted.first(), Some(&Timestamp::ZERO));
    assert_eq!(submitted.last(), Some(&Timestamp::from_micros(9_966_667)));

    // Fewer captures than output slots: repeats outside the tail are skipped.
    let metrics = c.metrics();
    assert!(metrics.duplicates_skipped > 0);
    assert_eq!(metrics.extras, 0);
    assert_eq!(output.stats.submitted, submitted.len() as u64);
    assert_eq!(log.muxed.len(), submitted.len());
}

#[tokio::test]
async fn first_output_frame_is_a_key_frame() {
    let mut c = controller(small_config(), Faults::default(), 3_000.0);
    Driver::new(30.0).record(&mut c).await.unwrap();

    let log = c.platform().log();
    assert_eq!(log.submissions.first().map(|(_, key)| *key), Some(true));
    let keys = log.submissions.iter().filter(|(_, key)| *key).count();
    // 90 frames with a key frame every 30.
    assert_eq!(keys, 3);
}

#[tokio::test]
async fn recording_with_display_faster_than_capture() {
    let mut c = controller(small_config(), Faults::default(), 2_000.0);
    let output = Driver::new(60.0).record(&mut c).await.unwrap();

    assert_eq!(output.output_frames, 60);
    assert!(output.bytes.starts_with(MEMORY_CONTAINER_HEADER));
    let metrics = c.metrics();
    assert!(metrics.frames_captured >= 60);
    assert_eq!(metrics.capture_failures, 0);
}

// ── Draining ───────────────────────────────────────────────────

#[tokio::test]
async fn ended_recording_drains_queue_before_finalizing() {
    let mut config = small_config();
    config.first_pass_threshold = 1_000;
    config.pass_threshold = 1_000;
    // Ends just short of the eighth tick's position, so exactly 8 captures.
    let duration = 7.0 * 1000.0 / 30.0 - 1.0;
    let mut c = controller(config, Faults::default(), duration);
    let events = c.events();
    let mut driver = Driver::new(30.0);

    driver.start(&mut c).unwrap();
    driver.count_down(&mut c).await.unwrap();
    driver.play_to_end(&mut c).await.unwrap();
    assert_eq!(c.state().queue.len(), 8);
    assert_eq!(c.metrics().passes, 0);

    let output = c.on_ended().await.unwrap();
    assert!(output.size() > MEMORY_CONTAINER_HEADER.len());
    assert_eq!(output.output_frames, 7);
    assert_eq!(c.metrics().queue_depth, 0);
    assert_eq!(c.metrics().frames_captured, 8);

    let phases: Vec<PipelinePhase> = events
        .try_iter()
        .filter_map(|e| match e {
            PipelineEvent::PhaseChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            PipelinePhase::Countdown,
            PipelinePhase::Recording,
            PipelinePhase::Draining,
            PipelinePhase::Finalizing,
            PipelinePhase::Done,
        ]
    );
}

#[tokio::test]
async fn pool_recycles_buffers_across_passes() {
    let mut c = controller(small_config(), Faults::default(), 10_000.0);
    let mut driver = Driver::new(30.0);
    driver.start(&mut c).unwrap();
    driver.count_down(&mut c).await.unwrap();
    driver.frames(&mut c, 200).await.unwrap();

    let pool = c.state().pool.stats();
    assert!(pool.reused > 0);
    // Allocation stops growing once passes retire frames into the pool.
    assert!(pool.allocated < 100);
    assert!(c.metrics().passes > 3);
}

// ── Fallback ───────────────────────────────────────────────────

#[tokio::test]
async fn rejected_primary_configuration_falls_back() {
    let faults = Faults {
        reject_configs: 1,
        ..Faults::default()
    };
    let mut c = controller(small_config(), faults, 1_000.0);
    let events = c.events();
    let mut driver = Driver::new(30.0);
    driver.start(&mut c).unwrap();

    let log = c.platform().log();
    assert_eq!(log.configs.len(), 2);
    assert_eq!(log.rejected_configs, 1);
    assert!(log.configs[1].bitrate_bps < log.configs[0].bitrate_bps);

    driver.count_down(&mut c).await.unwrap();
    driver.play_to_end(&mut c).await.unwrap();
    let output = c.on_ended().await.unwrap();
    assert!(output.fallback.is_some());
    assert!(events
        .try_iter()
        .any(|e| matches!(e, PipelineEvent::Done { .. })));
}

// ── Restart ────────────────────────────────────────────────────

#[tokio::test]
async fn restart_mid_recording_releases_everything() {
    let mut c = controller(small_config(), Faults::default(), 10_000.0);
    let mut driver = Driver::new(30.0);
    driver.start(&mut c).unwrap();
    driver.count_down(&mut c).await.unwrap();
    driver.frames(&mut c, 50).await.unwrap();
    assert!(c.metrics().frames_encoded > 0);

    c.restart(driver.now_ms).unwrap();
    assert_eq!(c.phase(), PipelinePhase::Countdown);
    assert_eq!(c.state().queue.len(), 0);
    assert!(c.state().pool.is_empty());
    assert_eq!(c.state().resampler.retained(), 0);
    assert_eq!(c.state().resampler.next_index(), 0);

    let log = c.platform().log();
    assert_eq!(log.encoders_closed, 1);
    assert_eq!(log.muxers_finished, 0);

    // The new attempt records from the start with a fresh session.
    let output = {
        driver.count_down(&mut c).await.unwrap();
        assert_eq!(c.source().current_time_ms(), 0.0);
        driver.play_to_end(&mut c).await.unwrap();
        c.on_ended().await.unwrap()
    };
    assert_eq!(output.output_frames, 300);
    assert_eq!(c.platform().log().muxers_finished, 1);
}

#[tokio::test]
async fn attempts_get_distinct_file_names() {
    let mut c = controller(small_config(), Faults::default(), 500.0);
    let mut driver = Driver::new(30.0);
    let first = driver.record(&mut c).await.unwrap();
    c.reset();
    let second = driver.record(&mut c).await.unwrap();
    assert_ne!(first.file_name, second.file_name);
    assert_eq!(first.output_frames, second.output_frames);
}
