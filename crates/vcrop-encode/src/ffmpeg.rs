//! H.264 encoding through an FFmpeg sidecar process.
//!
//! Raw RGBA frames are piped into `ffmpeg`, which writes an Annex-B baseline
//! stream with access-unit delimiters to stdout. A reader task splits that
//! stream back into one chunk per frame and stamps each chunk with the
//! timestamp of the frame it came from (FFmpeg keeps frame order, and the
//! stream has no B-frames).

use crate::chunk::{ChunkMetadata, ChunkSender, EncodedChunk};
use crate::encoder::{CodecPlatform, EncoderConfig, VideoEncoder};
use crate::error::{EncodeError, EncodeResult};
use crate::mp4::Mp4Muxer;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vcrop_core::{OutputProfile, PixelBuffer, Timestamp};

// ── NAL units ───────────────────────────────────────────────────

const NAL_IDR: u8 = 5;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;
const NAL_AUD: u8 = 9;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// NAL unit payloads (header byte first) of an Annex-B byte stream.
pub fn nal_units(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(starts.len());
    for (k, &start) in starts.iter().enumerate() {
        let mut end = starts.get(k + 1).map_or(data.len(), |next| next - 3);
        // Zero byte of a following 4-byte start code, or trailing zeros.
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > start {
            units.push(&data[start..end]);
        }
    }
    units
}

fn nal_type(unit: &[u8]) -> u8 {
    unit[0] & 0x1f
}

/// Whether an access unit contains an IDR slice.
pub fn is_keyframe(access_unit: &[u8]) -> bool {
    nal_units(access_unit).iter().any(|u| nal_type(u) == NAL_IDR)
}

/// Re-emit an access unit without its delimiter, using 4-byte start codes.
fn strip_delimiters(access_unit: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(access_unit.len());
    for unit in nal_units(access_unit) {
        if nal_type(unit) != NAL_AUD {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(unit);
        }
    }
    out
}

/// SPS and PPS of an access unit, in Annex-B form.
fn parameter_sets(access_unit: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    for unit in nal_units(access_unit) {
        if matches!(nal_type(unit), NAL_SPS | NAL_PPS) {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(unit);
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Position of the start code of the first access-unit delimiter at or after
/// `from`, including the leading zero of a 4-byte start code.
fn find_delimiter(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 3 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 && data[i + 3] & 0x1f == NAL_AUD {
            let start = if i > from && data[i - 1] == 0 { i - 1 } else { i };
            return Some(start);
        }
        i += 1;
    }
    None
}

/// Splits an Annex-B byte stream into access units at delimiter NALs.
#[derive(Debug, Default)]
pub struct AccessUnitSplitter {
    buf: Vec<u8>,
}

impl AccessUnitSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the encoder.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// The next complete access unit, if the following delimiter has arrived.
    pub fn next_unit(&mut self) -> Option<Vec<u8>> {
        let first = find_delimiter(&self.buf, 0)?;
        let next = find_delimiter(&self.buf, first + 4)?;
        let unit = self.buf[first..next].to_vec();
        self.buf.drain(..next);
        Some(unit)
    }

    /// Whatever remains once the stream has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buf);
        let start = find_delimiter(&rest, 0).unwrap_or(0);
        let unit = &rest[start..];
        nal_units(unit)
            .iter()
            .any(|u| nal_type(u) != NAL_AUD)
            .then(|| unit.to_vec())
    }

    /// Bytes waiting for the next delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

// ── Command line ────────────────────────────────────────────────

/// FFmpeg arguments for one encoder configuration.
pub fn ffmpeg_args(config: &EncoderConfig) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

    // Input from pipe (raw frames)
    args.extend_from_slice(&[
        "-f".into(),
        "rawvideo".into(),
        "-pixel_format".into(),
        "rgba".into(),
        "-video_size".into(),
        format!("{}x{}", config.width, config.height),
    ]);
    if let Some(rate) = config.frame_rate {
        args.extend_from_slice(&["-framerate".into(), format!("{}/{}", rate.numerator, rate.denominator)]);
    }
    args.extend_from_slice(&["-i".into(), "pipe:0".into(), "-an".into()]);

    // Video codec
    args.extend_from_slice(&[
        "-c:v".into(),
        "libx264".into(),
        "-profile:v".into(),
        "baseline".into(),
    ]);
    if let Some(level) = config.level {
        args.extend_from_slice(&["-level:v".into(), level.as_str().into()]);
    }
    args.extend_from_slice(&[
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-b:v".into(),
        config.bitrate_bps.to_string(),
        "-bf".into(),
        "0".into(),
        "-x264-params".into(),
        format!(
            "aud=1:repeat-headers=1:keyint={0}:min-keyint={0}:scenecut=0",
            config.keyframe_interval.max(1)
        ),
    ]);
    if config.realtime {
        args.extend_from_slice(&[
            "-preset".into(),
            "veryfast".into(),
            "-tune".into(),
            "zerolatency".into(),
        ]);
    }

    // Output
    args.extend_from_slice(&["-f".into(), "h264".into(), "pipe:1".into()]);
    args
}

fn validate(config: &EncoderConfig) -> EncodeResult<()> {
    if config.width == 0 || config.height == 0 || config.width % 2 != 0 || config.height % 2 != 0 {
        return Err(EncodeError::ConfigRejected(format!(
            "{}x{} is not a valid 4:2:0 frame size",
            config.width, config.height
        )));
    }
    if config.bitrate_bps == 0 {
        return Err(EncodeError::ConfigRejected("bitrate must be non-zero".into()));
    }
    if let Some(level) = config.level {
        if !level.fits(config.width, config.height) {
            return Err(EncodeError::ConfigRejected(format!(
                "{}x{} exceeds the frame size of level {}",
                config.width,
                config.height,
                level.as_str()
            )));
        }
    }
    Ok(())
}

// ── Encoder ─────────────────────────────────────────────────────

type PendingTimestamps = Arc<Mutex<VecDeque<Timestamp>>>;

/// Frames handed to the stdin writer but not yet written.
const INPUT_QUEUE_FRAMES: usize = 2;

/// A [`VideoEncoder`] backed by one `ffmpeg` child per configuration.
///
/// `configure` spawns the process and must run inside a Tokio runtime.
/// Frames reach stdin through a writer task, so a cancelled `encode` never
/// leaves a partial frame in the pipe or a timestamp without a frame.
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    child: Option<Child>,
    input: Option<mpsc::Sender<(Vec<u8>, Timestamp)>>,
    writer: Option<JoinHandle<EncodeResult<u64>>>,
    reader: Option<JoinHandle<EncodeResult<u64>>>,
    pending: PendingTimestamps,
    frame_bytes: usize,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            child: None,
            input: None,
            writer: None,
            reader: None,
            pending: Arc::default(),
            frame_bytes: 0,
        }
    }

    /// Frames written to ffmpeg but not yet returned by it.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn configure(&mut self, config: &EncoderConfig, output: ChunkSender) -> EncodeResult<()> {
        validate(config)?;
        self.close();

        let mut child = Command::new(&self.ffmpeg)
            .args(ffmpeg_args(config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EncodeError::Unavailable(format!("failed to spawn {}: {e}", self.ffmpeg.display())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncodeError::Unavailable("failed to open ffmpeg stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EncodeError::Unavailable("failed to open ffmpeg stdout".into()))?;

        self.pending.lock().clear();
        let (input, frames) = mpsc::channel(INPUT_QUEUE_FRAMES);
        self.writer = Some(tokio::spawn(write_frames(stdin, frames, Arc::clone(&self.pending))));
        self.reader = Some(tokio::spawn(read_access_units(stdout, Arc::clone(&self.pending), output)));
        self.input = Some(input);
        self.child = Some(child);
        self.frame_bytes = PixelBuffer::byte_len(config.width, config.height);

        info!(
            width = config.width,
            height = config.height,
            bitrate = config.bitrate_bps,
            "FFmpeg encoder started"
        );
        Ok(())
    }

    /// x264 places IDR frames on its own fixed cadence, configured to match
    /// the session's, so `key_frame` is not forwarded.
    ///
    /// Cancel-safe: the only await is the channel send, which either queues
    /// the whole frame or nothing.
    async fn encode(&mut self, frame: &PixelBuffer, timestamp: Timestamp, _key_frame: bool) -> EncodeResult<()> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| EncodeError::InvalidState("encoder not configured".into()))?;
        if frame.as_bytes().len() != self.frame_bytes {
            return Err(EncodeError::Frame(format!(
                "frame is {} bytes, encoder expects {}",
                frame.as_bytes().len(),
                self.frame_bytes
            )));
        }

        input
            .send((frame.as_bytes().to_vec(), timestamp))
            .await
            .map_err(|_| EncodeError::Frame("ffmpeg input closed".into()))
    }

    async fn flush(&mut self) -> EncodeResult<()> {
        // Closing the queue lets the writer finish and close stdin.
        let input = self
            .input
            .take()
            .ok_or_else(|| EncodeError::InvalidState("encoder not configured".into()))?;
        drop(input);

        if let Some(writer) = self.writer.take() {
            let frames = writer
                .await
                .map_err(|e| EncodeError::Flush(format!("writer task failed: {e}")))??;
            debug!(frames, "FFmpeg input closed");
        }

        if let Some(reader) = self.reader.take() {
            let units = reader
                .await
                .map_err(|e| EncodeError::Flush(format!("reader task failed: {e}")))??;
            debug!(units, "FFmpeg output drained");
        }

        if let Some(mut child) = self.child.take() {
            let status = child.wait().await?;
            if !status.success() {
                return Err(EncodeError::Flush(format!("ffmpeg exited with status: {status}")));
            }
        }

        let lost = self.pending.lock().len();
        if lost > 0 {
            warn!(lost, "FFmpeg returned fewer frames than were written");
        }
        Ok(())
    }

    fn close(&mut self) {
        self.input = None;
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
        self.pending.lock().clear();
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.close();
    }
}

/// Feed queued frames to ffmpeg's stdin, one whole frame at a time.
async fn write_frames(
    mut stdin: ChildStdin,
    mut frames: mpsc::Receiver<(Vec<u8>, Timestamp)>,
    pending: PendingTimestamps,
) -> EncodeResult<u64> {
    let mut written = 0u64;
    while let Some((bytes, timestamp)) = frames.recv().await {
        // Queued first: ffmpeg may emit the frame before write_all returns.
        pending.lock().push_back(timestamp);
        if let Err(e) = stdin.write_all(&bytes).await {
            pending.lock().pop_back();
            return Err(EncodeError::Flush(format!("failed to write frame: {e}")));
        }
        written += 1;
    }
    stdin.shutdown().await?;
    Ok(written)
}

async fn read_access_units(
    mut stdout: ChildStdout,
    pending: PendingTimestamps,
    output: ChunkSender,
) -> EncodeResult<u64> {
    let mut splitter = AccessUnitSplitter::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut emitted = 0u64;

    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        splitter.push(&buf[..n]);
        while let Some(unit) = splitter.next_unit() {
            if !emit(&unit, &pending, &output)? {
                return Ok(emitted);
            }
            emitted += 1;
        }
    }

    if let Some(unit) = splitter.finish() {
        if emit(&unit, &pending, &output)? {
            emitted += 1;
        }
    }
    Ok(emitted)
}

/// Send one access unit. Returns `false` once the session has gone away.
fn emit(unit: &[u8], pending: &PendingTimestamps, output: &ChunkSender) -> EncodeResult<bool> {
    let timestamp = pending
        .lock()
        .pop_front()
        .ok_or_else(|| EncodeError::Flush("encoder produced more frames than were written".into()))?;
    let key_frame = is_keyframe(unit);
    let chunk = EncodedChunk {
        data: strip_delimiters(unit),
        timestamp,
        key_frame,
        metadata: ChunkMetadata {
            decoder_config: if key_frame { parameter_sets(unit) } else { None },
        },
    };
    Ok(output.send(chunk).is_ok())
}

// ── Platform ────────────────────────────────────────────────────

/// FFmpeg encoder plus the MP4 muxer.
#[derive(Debug, Clone, Default)]
pub struct FfmpegPlatform {
    /// Explicit binary; `None` uses the sidecar location.
    ffmpeg: Option<PathBuf>,
}

impl FfmpegPlatform {
    /// Use the FFmpeg binary managed by `ffmpeg-sidecar`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific FFmpeg binary.
    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: Some(path.into()),
        }
    }

    pub fn ffmpeg_path(&self) -> PathBuf {
        self.ffmpeg
            .clone()
            .unwrap_or_else(ffmpeg_sidecar::paths::ffmpeg_path)
    }
}

impl CodecPlatform for FfmpegPlatform {
    type Encoder = FfmpegEncoder;
    type Muxer = Mp4Muxer;

    fn encoder_available(&self) -> bool {
        match &self.ffmpeg {
            Some(path) => path.is_file(),
            None => ffmpeg_sidecar::command::ffmpeg_is_installed(),
        }
    }

    fn create_encoder(&self) -> FfmpegEncoder {
        FfmpegEncoder::new(self.ffmpeg_path())
    }

    fn create_muxer(&self, profile: &OutputProfile) -> EncodeResult<Mp4Muxer> {
        Mp4Muxer::new(profile)
    }
}
