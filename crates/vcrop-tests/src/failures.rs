//! Failure handling: encoder faults, timeouts and cancellation.

use crate::harness::{controller, small_config, Driver};
use proptest::prelude::*;
use vcrop_core::PipelineConfig;
use vcrop_encode::testing::Faults;
use vcrop_pipeline::{PipelineError, PipelineEvent, PipelinePhase};

#[tokio::test]
async fn missing_encoder_fails_before_recording() {
    let faults = Faults {
        unavailable: true,
        ..Faults::default()
    };
    let mut c = controller(small_config(), faults, 1_000.0);
    let err = Driver::new(30.0).record(&mut c).await.unwrap_err();
    assert!(matches!(err, PipelineError::Encode(_)));
    assert_eq!(c.phase(), PipelinePhase::Error);
    assert!(!c.source().is_playing());
}

#[tokio::test]
async fn failed_frame_is_dropped_and_recording_completes() {
    let faults = Faults {
        fail_frames: vec![3],
        ..Faults::default()
    };
    let mut c = controller(small_config(), faults, 1_000.0);
    let events = c.events();
    let output = Driver::new(30.0).record(&mut c).await.unwrap();

    assert_eq!(output.stats.dropped, 1);
    assert_eq!(c.metrics().frames_dropped, 1);
    assert!(!output.warnings.is_empty());
    assert!(events
        .try_iter()
        .any(|e| matches!(e, PipelineEvent::Warning(_))));
}

#[tokio::test(start_paused = true)]
async fn stalled_frame_times_out() {
    let mut config = small_config();
    config.frame_timeout_ms = 50;
    let faults = Faults {
        stall_frames: vec![0],
        ..Faults::default()
    };
    let mut c = controller(config, faults, 1_000.0);
    let output = Driver::new(30.0).record(&mut c).await.unwrap();

    assert_eq!(output.stats.timed_out, 1);
    // The key frame was lost, so the next accepted frame is forced key.
    let log = c.platform().log();
    assert_eq!(log.submissions.get(1).map(|(_, key)| *key), Some(true));
}

#[tokio::test]
async fn flush_failure_reports_error_and_allows_retry() {
    let faults = Faults {
        fail_flush: true,
        ..Faults::default()
    };
    let mut c = controller(small_config(), faults, 500.0);
    let events = c.events();
    let mut driver = Driver::new(30.0);
    assert!(driver.record(&mut c).await.is_err());
    assert_eq!(c.phase(), PipelinePhase::Error);
    assert!(c.last_error().is_some());
    assert!(events
        .try_iter()
        .any(|e| matches!(e, PipelineEvent::Failed(_))));
    assert_eq!(c.platform().log().encoders_closed, 1);

    c.retry(driver.now_ms).unwrap();
    assert_eq!(c.phase(), PipelinePhase::Countdown);
}

#[tokio::test]
async fn recording_without_frames_fails_cleanly() {
    let mut c = controller(small_config(), Faults::default(), 1_000.0);
    c.source_mut().detach();
    let mut driver = Driver::new(30.0);
    driver.start(&mut c).unwrap();
    driver.count_down(&mut c).await.unwrap();
    driver.play_to_end(&mut c).await.unwrap();
    assert_eq!(c.metrics().frames_captured, 0);
    assert!(c.metrics().capture_failures > 0);

    assert!(c.on_ended().await.is_err());
    assert_eq!(c.phase(), PipelinePhase::Error);
    assert!(c.state().pool.is_empty());
}

#[tokio::test]
async fn cancel_during_recording_discards_output() {
    let mut c = controller(small_config(), Faults::default(), 5_000.0);
    let mut driver = Driver::new(30.0);
    driver.start(&mut c).unwrap();
    driver.count_down(&mut c).await.unwrap();
    driver.frames(&mut c, 40).await.unwrap();

    c.cancel().unwrap();
    assert_eq!(c.phase(), PipelinePhase::Cancelled);
    assert!(c.state().session.is_none());
    let log = c.platform().log();
    assert_eq!(log.encoders_closed, 1);
    assert_eq!(log.muxers_finished, 0);
    assert!(matches!(
        c.on_ended().await,
        Err(PipelineError::InvalidTransition { .. })
    ));
}

#[test]
fn config_file_drives_the_controller() {
    let json = r#"{ "capture_fps": 24.0, "countdown_ms": 0, "output": { "width": 16, "height": 28 } }"#;
    let config = PipelineConfig::from_json_str(json).unwrap();
    assert_eq!(config.capture_fps, 24.0);
    assert_eq!(config.output.width, 16);
    let c = controller(config, Faults::default(), 1_000.0);
    assert_eq!(c.phase(), PipelinePhase::Idle);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn submissions_are_monotonic_for_any_capture_rate(
        capture_fps in 10.0f64..60.0,
        duration_ms in 300.0f64..3_000.0,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let mut config = small_config();
        config.capture_fps = capture_fps;
        let mut c = controller(config, Faults::default(), duration_ms);

        let output = runtime
            .block_on(Driver::new(capture_fps).record(&mut c))
            .unwrap();

        let log = c.platform().log();
        for pair in log.submissions.windows(2) {
            prop_assert!(pair[1].0 > pair[0].0);
        }
        prop_assert!(output.output_frames > 0);
        prop_assert_eq!(log.muxed.len() as u64, output.stats.submitted);
        prop_assert!(c.state().pool.is_empty());
    }
}
