//! vcrop - vertical re-recording of a landscape video
//!
//! Plays a synthetic landscape clip, pans a 9:16 mask across it and writes
//! the recorded portrait MP4 to the working directory.
//!
//! Usage: `vcrop [config.json] [seconds]`

use anyhow::{bail, Context, Result};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vcrop_capture::{BufferSource, FixedMask, PixelSource};
use vcrop_core::{PipelineConfig, PixelBuffer, Rect};
use vcrop_encode::FfmpegPlatform;
use vcrop_pipeline::{PipelineController, PipelineEvent, PipelinePhase};

const SOURCE_WIDTH: u32 = 1280;
const SOURCE_HEIGHT: u32 = 720;
const DISPLAY_FPS: f64 = 60.0;
const DEFAULT_SECONDS: f64 = 5.0;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("vcrop starting...");

    let (config, seconds) = parse_args()?;
    let duration_ms = seconds * 1000.0;

    let source = BufferSource::new(PixelBuffer::new(SOURCE_WIDTH, SOURCE_HEIGHT), duration_ms);
    let video = Rect::new(0.0, 0.0, SOURCE_WIDTH as f32, SOURCE_HEIGHT as f32);
    let mask = FixedMask {
        mask: Rect::new(0.0, 0.0, SOURCE_HEIGHT as f32 * 9.0 / 16.0, SOURCE_HEIGHT as f32),
        video,
    };

    let mut controller = PipelineController::new(config, FfmpegPlatform::new(), source, mask)?;
    let events = controller.events();

    let started = Instant::now();
    let mut last_ms = 0.0;
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / DISPLAY_FPS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    controller.start(0.0)?;
    loop {
        ticker.tick().await;
        let now_ms = started.elapsed().as_secs_f64() * 1000.0;
        let dt_ms = now_ms - last_ms;
        last_ms = now_ms;

        if controller.phase() == PipelinePhase::Recording {
            let source = controller.source_mut();
            source.advance(dt_ms);
            let t_ms = source.current_time_ms();
            if let Some(frame) = source.frame_mut() {
                paint_scene(frame, t_ms);
            }
            pan_mask(controller.mask_mut(), t_ms, duration_ms);
        }

        let phase = controller.tick(now_ms).await?;
        events.try_iter().for_each(report);

        if phase == PipelinePhase::Recording && controller.source().is_ended() {
            break;
        }
        if phase.is_terminal() {
            bail!("recording stopped in {phase:?}");
        }
    }

    let result = controller.on_ended().await;
    events.try_iter().for_each(report);
    let output = result?;

    let dir = std::env::current_dir()?;
    let path = output
        .write_to(&dir)
        .with_context(|| format!("failed to write {}", output.file_name))?;
    info!(
        path = %path.display(),
        size = output.size(),
        frames = output.output_frames,
        duration = %output.duration,
        "Recording saved"
    );
    if let Some(reason) = &output.fallback {
        warn!(%reason, "Encoded with the fallback configuration");
    }

    let metrics = controller.metrics();
    info!(
        captured = metrics.frames_captured,
        encoded = metrics.frames_encoded,
        dropped = metrics.frames_dropped,
        passes = metrics.passes,
        peak_queue = metrics.queue_high_water,
        "Pipeline summary"
    );
    Ok(())
}

/// `[config.json] [seconds]`, in either order.
fn parse_args() -> Result<(PipelineConfig, f64)> {
    let mut config = None;
    let mut seconds = DEFAULT_SECONDS;
    for arg in std::env::args().skip(1) {
        if let Ok(value) = arg.parse::<f64>() {
            if !(value.is_finite() && value > 0.0) {
                bail!("duration must be a positive number of seconds, got {arg}");
            }
            seconds = value;
        } else {
            let loaded = PipelineConfig::load(&arg).with_context(|| format!("failed to load config {arg}"))?;
            config = Some(loaded);
        }
    }
    Ok((config.unwrap_or_default(), seconds))
}

/// Gradient background with a white bar sweeping left to right.
fn paint_scene(frame: &mut PixelBuffer, t_ms: f64) {
    let width = frame.width().max(1);
    let height = frame.height().max(1);
    let bar_x = ((t_ms / 1000.0 * 240.0) as u32) % width;
    for y in 0..frame.height() {
        let shade = (y * 255 / height) as u8;
        let row = frame.row_mut(y);
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let x = x as u32;
            let rgba = if x.abs_diff(bar_x) < 24 {
                [255, 255, 255, 255]
            } else {
                [(x * 255 / width) as u8, shade, 128, 255]
            };
            px.copy_from_slice(&rgba);
        }
    }
}

/// Pan the mask across the video and back over the clip.
fn pan_mask(mask: &mut FixedMask, t_ms: f64, duration_ms: f64) {
    let travel = mask.video.width - mask.mask.width;
    let progress = (t_ms / duration_ms).clamp(0.0, 1.0) as f32;
    let there_and_back = if progress < 0.5 { progress * 2.0 } else { 2.0 - progress * 2.0 };
    mask.mask.x = mask.video.x + travel * there_and_back;
}

fn report(event: PipelineEvent) {
    match event {
        PipelineEvent::PhaseChanged { .. } => {}
        PipelineEvent::Progress(percent) => info!("Encoding {percent}%"),
        PipelineEvent::Warning(message) => warn!("{message}"),
        PipelineEvent::Done { file_name, size } => info!(%file_name, size, "Done"),
        PipelineEvent::Failed(message) => error!("{message}"),
    }
}
