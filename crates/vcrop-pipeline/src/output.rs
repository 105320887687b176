//! The finished recording and its download name.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use vcrop_core::output::EXTENSION;
use vcrop_core::Timestamp;
use vcrop_encode::{ConfiguredWith, SessionStats};

/// Prefix of every generated file name.
pub const FILE_PREFIX: &str = "vertical";

/// `vertical-YYYYMMDD-HHMMSS-xxxxxx.mp4`
pub fn file_name(now: DateTime<Local>, suffix: Uuid) -> String {
    let random = suffix.simple().to_string();
    format!(
        "{FILE_PREFIX}-{}-{}.{EXTENSION}",
        now.format("%Y%m%d-%H%M%S"),
        &random[..6]
    )
}

/// A file name stamped with the current local time.
pub fn generate_file_name() -> String {
    file_name(Local::now(), Uuid::new_v4())
}

/// A finalized recording.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingOutput {
    pub file_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Output indices covered, including skipped duplicates.
    pub output_frames: u64,
    /// Presentation time of the last output index.
    pub duration: Timestamp,
    /// `None` when the primary configuration was used.
    pub fallback: Option<String>,
    #[serde(skip)]
    pub stats: SessionStats,
    pub warnings: Vec<String>,
}

impl RecordingOutput {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn fallback_note(used: Option<ConfiguredWith>, reason: Option<&str>) -> Option<String> {
        match used {
            Some(ConfiguredWith::Fallback) => Some(reason.unwrap_or("primary configuration rejected").to_string()),
            _ => None,
        }
    }

    /// Write the file into `dir` under its generated name.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}
