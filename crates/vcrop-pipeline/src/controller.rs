//! Pipeline controller: one recording from countdown to finished file.
//!
//! ```text
//! Idle -> Countdown -> Recording -> Draining -> Finalizing -> Done
//!                          \            \            \
//!                           +------------+------------+--> Error | Cancelled
//! ```
//!
//! The host calls [`PipelineController::tick`] once per display frame and
//! [`PipelineController::on_ended`] when playback reaches the end. Capture
//! never waits on the encoder; instead the controller drains the capture
//! queue with a resampler pass whenever it grows past a threshold or the
//! memory estimate passes the ceiling.

use crate::cancel::CancelHandle;
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventSink, PipelineEvent};
use crate::metrics::PipelineMetrics;
use crate::output::{generate_file_name, RecordingOutput};
use crate::resampler::{Horizon, Resampler};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use vcrop_capture::{BufferPool, CaptureQueue, FrameSampler, MaskGeometry, PixelSource, PlaybackControl, SamplerConfig};
use vcrop_core::PipelineConfig;
use vcrop_encode::{CodecPlatform, EncoderSession, SessionOptions, SubmitOutcome};

/// Where a recording attempt is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelinePhase {
    Idle,
    Countdown,
    Recording,
    Draining,
    Finalizing,
    Done,
    Error,
    Cancelled,
}

impl PipelinePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }

    /// An attempt is in progress and holds resources.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Countdown | Self::Recording | Self::Draining | Self::Finalizing)
    }
}

/// Summary of one resampler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub planned: usize,
    pub submitted: usize,
    pub dropped: usize,
    pub rejected: usize,
    /// Frames returned to the pool after the pass.
    pub retired: usize,
}

// ── Pipeline state ──────────────────────────────────────────────

/// Everything a recording attempt owns.
///
/// Every captured buffer lives in exactly one of `pool`, `queue` or
/// `resampler`, apart from the one the sampler is drawing into.
pub struct PipelineState<P: CodecPlatform> {
    pub pool: BufferPool,
    pub queue: CaptureQueue,
    pub sampler: FrameSampler,
    pub resampler: Resampler,
    /// One session per attempt, never reused.
    pub session: Option<EncoderSession<P>>,
    pub cancel: CancelHandle,
    pub passes: u64,
    pub forced_passes: u64,
    countdown_started_ms: Option<f64>,
    queue_warned: bool,
}

impl<P: CodecPlatform> PipelineState<P> {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            pool: BufferPool::new(config.pool_capacity),
            queue: CaptureQueue::new(),
            sampler: FrameSampler::new(SamplerConfig::from_pipeline(config)),
            resampler: Resampler::new(config.output.frame_rate, config.tail_fraction),
            session: None,
            cancel: CancelHandle::new(),
            passes: 0,
            forced_passes: 0,
            countdown_started_ms: None,
            queue_warned: false,
        }
    }

    /// Bytes of pixel data held by the queue, the pool and the resampler.
    pub fn memory_estimate(&self) -> usize {
        self.queue.memory_bytes() + self.pool.memory_usage() + self.resampler.retained_bytes()
    }

    /// Create and initialize this attempt's session unless it exists.
    pub fn ensure_session(&mut self, platform: &P, config: &PipelineConfig) -> PipelineResult<()> {
        if self.session.is_none() {
            let mut session = EncoderSession::new(SessionOptions::from_pipeline(config));
            session.initialize(platform)?;
            self.session = Some(session);
        }
        Ok(())
    }

    /// Take up to `chunk_size` frames from the queue, plan their output
    /// slots and submit them in order.
    pub async fn run_pass(
        &mut self,
        platform: &P,
        config: &PipelineConfig,
        chunk_size: usize,
        horizon: Horizon,
    ) -> PipelineResult<PassReport> {
        self.ensure_session(platform, config)?;

        let chunk = self.queue.take_chunk(chunk_size);
        let taken = chunk.len();
        let slots = self.resampler.plan(chunk, horizon);
        let mut report = PassReport {
            planned: slots.len(),
            ..PassReport::default()
        };

        for (n, slot) in slots.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let frame = self
                .resampler
                .frame(slot)
                .ok_or_else(|| PipelineError::Internal(format!("output slot {} lost its frame", slot.index)))?;
            let session = self
                .session
                .as_mut()
                .ok_or_else(|| PipelineError::Internal("no encoder session".into()))?;

            match session.submit(&frame.buffer, slot.target).await? {
                SubmitOutcome::Submitted { .. } => report.submitted += 1,
                SubmitOutcome::Dropped(_) => report.dropped += 1,
                SubmitOutcome::Rejected(_) => report.rejected += 1,
            }

            if (n + 1) % config.yield_every == 0 {
                tokio::task::yield_now().await;
            }
        }

        report.retired = match horizon {
            Horizon::Chunk => self.resampler.retire(&mut self.pool),
            Horizon::End => self.resampler.retire_all(&mut self.pool),
        };
        self.passes += 1;
        debug!(
            taken,
            planned = report.planned,
            submitted = report.submitted,
            dropped = report.dropped,
            retained = self.resampler.retained(),
            ?horizon,
            "Resampler pass complete"
        );
        Ok(report)
    }

    /// Abort the session and release every buffer. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.cancel.cancel();
        if let Some(mut session) = self.session.take() {
            session.abort();
        }
        self.queue.drain_into(&mut self.pool);
        self.queue.clear();
        self.resampler.reset(&mut self.pool);
        self.pool.clear();
        self.sampler.reset();
        self.passes = 0;
        self.forced_passes = 0;
        self.countdown_started_ms = None;
        self.queue_warned = false;
    }
}

// ── Controller ──────────────────────────────────────────────────

pub struct PipelineController<P, S, M>
where
    P: CodecPlatform,
    S: PixelSource + PlaybackControl,
    M: MaskGeometry,
{
    config: PipelineConfig,
    platform: P,
    source: S,
    mask: M,
    phase: PipelinePhase,
    state: PipelineState<P>,
    metrics: PipelineMetrics,
    events: EventSink,
    last_error: Option<String>,
    last_progress: u8,
    warnings_seen: u64,
}

impl<P, S, M> PipelineController<P, S, M>
where
    P: CodecPlatform,
    S: PixelSource + PlaybackControl,
    M: MaskGeometry,
{
    pub fn new(config: PipelineConfig, platform: P, source: S, mask: M) -> PipelineResult<Self> {
        config.validate()?;
        let state = PipelineState::new(&config);
        Ok(Self {
            config,
            platform,
            source,
            mask,
            phase: PipelinePhase::Idle,
            state,
            metrics: PipelineMetrics::default(),
            events: EventSink::new(),
            last_error: None,
            last_progress: 0,
            warnings_seen: 0,
        })
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics
    }

    pub fn state(&self) -> &PipelineState<P> {
        &self.state
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn mask(&self) -> &M {
        &self.mask
    }

    pub fn mask_mut(&mut self) -> &mut M {
        &mut self.mask
    }

    /// Event stream for the UI.
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Handle that interrupts the current attempt.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.state.cancel.clone()
    }

    /// Message of the last failure, shown next to the retry affordance.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Encoding progress, 0 to 100. For a source of unknown length this is
    /// how far encoding has caught up with capture.
    pub fn progress(&self) -> u8 {
        match self.phase {
            PipelinePhase::Done => 100,
            PipelinePhase::Idle | PipelinePhase::Countdown => 0,
            _ => {
                let resampler = &self.state.resampler;
                // Without a known duration, measure against what has been captured.
                let span_ms = resampler.duration_ms().or_else(|| {
                    let start = resampler.start_ms()?;
                    let last = self.state.sampler.last_timestamp_ms()?;
                    Some(last - start)
                });
                let total = span_ms
                    .map(|d| self.config.output.frame_rate.frames_covering(d))
                    .unwrap_or(0);
                if total == 0 {
                    return 0;
                }
                (resampler.next_index() * 100 / total).min(99) as u8
            }
        }
    }

    // ── Transitions ─────────────────────────────────────────────

    /// Begin a recording attempt: `Idle -> Countdown`.
    pub fn start(&mut self, now_ms: f64) -> PipelineResult<()> {
        if self.phase != PipelinePhase::Idle {
            return Err(self.invalid("start"));
        }
        self.enter_countdown(now_ms)
    }

    /// Tear the current attempt down and count down again.
    pub fn restart(&mut self, now_ms: f64) -> PipelineResult<()> {
        info!(phase = ?self.phase, "Restarting recording");
        self.enter_countdown(now_ms)
    }

    /// Start over after `Error` or `Cancelled`.
    pub fn retry(&mut self, now_ms: f64) -> PipelineResult<()> {
        if !matches!(self.phase, PipelinePhase::Error | PipelinePhase::Cancelled) {
            return Err(self.invalid("retry"));
        }
        self.enter_countdown(now_ms)
    }

    /// Stop the current attempt and discard its output.
    pub fn cancel(&mut self) -> PipelineResult<()> {
        if !self.phase.is_active() {
            return Err(self.invalid("cancel"));
        }
        self.abandon();
        Ok(())
    }

    /// Return to `Idle` from any phase, releasing everything.
    pub fn reset(&mut self) {
        self.state.teardown();
        self.source.pause();
        self.source.seek_to_start();
        self.metrics = PipelineMetrics::default();
        self.last_error = None;
        self.last_progress = 0;
        self.set_phase(PipelinePhase::Idle);
    }

    fn enter_countdown(&mut self, now_ms: f64) -> PipelineResult<()> {
        self.state.teardown();
        self.state.cancel = CancelHandle::new();
        self.source.pause();
        self.source.seek_to_start();
        self.metrics = PipelineMetrics::default();
        self.last_error = None;
        self.last_progress = 0;
        self.warnings_seen = 0;

        self.set_phase(PipelinePhase::Countdown);
        self.state.countdown_started_ms = Some(now_ms);

        if self.config.prewarm_session {
            if let Err(e) = self.state.ensure_session(&self.platform, &self.config) {
                return Err(self.fail(e));
            }
            self.forward_warnings();
        }
        Ok(())
    }

    fn begin_recording(&mut self) {
        self.source.play();
        let start_ms = self.source.current_time_ms();
        let end_ms = self.source.duration_ms();
        self.state.resampler.start_at(start_ms);
        self.state.resampler.set_end_ms(end_ms);
        info!(start_ms, ?end_ms, "Recording started");
        self.set_phase(PipelinePhase::Recording);
    }

    // ── Scheduling ──────────────────────────────────────────────

    /// One display tick at wall-clock time `now_ms`.
    ///
    /// During `Recording` this samples a frame and, when the queue is deep
    /// enough or memory is tight, runs a resampler pass.
    pub async fn tick(&mut self, now_ms: f64) -> PipelineResult<PipelinePhase> {
        if self.phase.is_active() && self.state.cancel.is_cancelled() {
            self.abandon();
            return Ok(self.phase);
        }

        match self.phase {
            PipelinePhase::Countdown => {
                let started = self.state.countdown_started_ms.unwrap_or(now_ms);
                if now_ms - started < self.config.countdown_ms as f64 {
                    return Ok(self.phase);
                }
                self.begin_recording();
            }
            PipelinePhase::Recording => {}
            _ => return Ok(self.phase),
        }

        self.state.sampler.sample(
            now_ms,
            &mut self.source,
            &self.mask,
            &mut self.state.pool,
            &mut self.state.queue,
        );

        let depth = self.state.queue.len();
        if depth > self.config.queue_warn_depth {
            if !self.state.queue_warned {
                self.state.queue_warned = true;
                warn!(depth, "Capture queue is deep");
                self.events
                    .emit(PipelineEvent::Warning(format!("capture queue holds {depth} frames")));
            }
        } else {
            self.state.queue_warned = false;
        }

        let first = self.state.passes == 0;
        let (threshold, chunk_size) = if first {
            (self.config.first_pass_threshold, self.config.first_chunk_size)
        } else {
            (self.config.pass_threshold, self.config.chunk_size)
        };
        let memory = self.state.memory_estimate();
        let over_ceiling = memory > self.config.memory_ceiling_bytes && depth > 0;

        if depth >= threshold || over_ceiling {
            if depth < threshold {
                self.state.forced_passes += 1;
                warn!(memory, ceiling = self.config.memory_ceiling_bytes, "Memory ceiling reached, forcing a pass");
            }
            self.pass(chunk_size, Horizon::Chunk).await?;
        }

        self.refresh_metrics();
        Ok(self.phase)
    }

    /// Playback reached the end: drain the queue, then flush and finalize.
    pub async fn on_ended(&mut self) -> PipelineResult<RecordingOutput> {
        if self.phase != PipelinePhase::Recording {
            return Err(self.invalid("finish recording"));
        }
        self.source.pause();
        self.set_phase(PipelinePhase::Draining);

        let chunk_size = self.config.chunk_size;
        while !self.state.queue.is_empty() {
            self.pass(chunk_size, Horizon::Chunk).await?;
        }
        self.pass(chunk_size, Horizon::End).await?;
        self.refresh_metrics();

        self.set_phase(PipelinePhase::Finalizing);
        match self.finalize().await {
            Ok(output) => Ok(output),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn pass(&mut self, chunk_size: usize, horizon: Horizon) -> PipelineResult<PassReport> {
        let result = self
            .state
            .run_pass(&self.platform, &self.config, chunk_size, horizon)
            .await;
        self.forward_warnings();

        match result {
            Ok(report) => {
                self.refresh_metrics();
                let progress = self.progress();
                if progress != self.last_progress {
                    self.last_progress = progress;
                    self.events.emit(PipelineEvent::Progress(progress));
                }
                Ok(report)
            }
            Err(PipelineError::Cancelled) => {
                self.abandon();
                Err(PipelineError::Cancelled)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn finalize(&mut self) -> PipelineResult<RecordingOutput> {
        let session = self
            .state
            .session
            .as_mut()
            .ok_or_else(|| PipelineError::Internal("no encoder session to finalize".into()))?;
        session.flush().await?;
        let bytes = session.finalize()?;

        let attempt = session.configuration();
        let fallback = RecordingOutput::fallback_note(
            attempt.map(|a| a.used),
            attempt.and_then(|a| a.primary_rejection.as_deref()),
        );
        let output_frames = self.state.resampler.next_index();
        let output = RecordingOutput {
            file_name: generate_file_name(),
            bytes,
            output_frames,
            duration: self.config.output.frame_rate.frame_time(output_frames),
            fallback,
            stats: session.stats(),
            warnings: session.warnings().to_vec(),
        };

        self.refresh_metrics();
        self.state.teardown();
        self.set_phase(PipelinePhase::Done);
        self.last_progress = 100;
        self.events.emit(PipelineEvent::Progress(100));
        self.events.emit(PipelineEvent::Done {
            file_name: output.file_name.clone(),
            size: output.size(),
        });
        info!(
            file = %output.file_name,
            size = output.size(),
            frames = output.stats.submitted,
            "Recording finished"
        );
        Ok(output)
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn set_phase(&mut self, to: PipelinePhase) {
        let from = self.phase;
        if from != to {
            self.phase = to;
            info!(?from, ?to, "Pipeline phase changed");
            self.events.emit(PipelineEvent::PhaseChanged { from, to });
        }
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        error!(error = %err, phase = ?self.phase, "Recording failed");
        let message = err.to_string();
        self.state.teardown();
        self.source.pause();
        self.last_error = Some(message.clone());
        self.set_phase(PipelinePhase::Error);
        self.events.emit(PipelineEvent::Failed(message));
        err
    }

    fn abandon(&mut self) {
        info!(phase = ?self.phase, "Recording cancelled");
        self.state.teardown();
        self.source.pause();
        self.set_phase(PipelinePhase::Cancelled);
    }

    fn invalid(&self, action: &'static str) -> PipelineError {
        PipelineError::InvalidTransition {
            action,
            phase: self.phase,
        }
    }

    fn forward_warnings(&mut self) {
        let Some(session) = self.state.session.as_ref() else {
            return;
        };
        let total = session.stats().warnings;
        let new = total.saturating_sub(self.warnings_seen) as usize;
        let kept = session.warnings();
        for warning in &kept[kept.len().saturating_sub(new)..] {
            self.events.emit(PipelineEvent::Warning(warning.clone()));
        }
        self.warnings_seen = total;
    }

    fn refresh_metrics(&mut self) {
        let sampler = self.state.sampler.stats();
        let resampler = self.state.resampler.stats();
        let m = &mut self.metrics;
        m.frames_captured = sampler.accepted;
        m.capture_failures = sampler.failures;
        m.output_frames = self.state.resampler.next_index();
        m.duplicates_skipped = resampler.duplicates_skipped;
        m.extras = resampler.extras;
        m.queue_depth = self.state.queue.len();
        m.queue_high_water = m.queue_high_water.max(self.state.queue.high_water());
        m.memory_bytes = self.state.memory_estimate();
        m.passes = self.state.passes;
        m.forced_passes = self.state.forced_passes;
        if let Some(session) = &self.state.session {
            let stats = session.stats();
            m.frames_encoded = stats.submitted;
            m.frames_dropped = stats.dropped;
        }
    }
}
