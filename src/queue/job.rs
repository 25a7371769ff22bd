//! Download job record and its state machine.
//!
//! A job is created `Queued` on submission, moved to `Downloading` by the
//! worker that dequeues it, and finished as `Completed` or `Failed` by that
//! same worker. Terminal states never change again.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest caller-supplied job id we accept.
const MAX_JOB_ID_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("sourceID must not be empty")]
    MissingSourceId,
    #[error("invalid job id: {0}")]
    InvalidJobId(String),
}

/// Correlation key for a job, unique among in-flight jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a time-sortable id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Accept a caller-supplied id.
    pub fn parse(raw: &str) -> Result<Self, RequestError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > MAX_JOB_ID_LEN
            || trimmed.chars().any(|c| c.is_control() || c == '/')
        {
            return Err(RequestError::InvalidJobId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested output kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "container")]
pub enum MediaFormat {
    /// Audio-only extraction.
    Audio,
    /// Video in the preferred container (`mp4`, `webm`, `mkv`).
    Video(String),
}

impl MediaFormat {
    const VIDEO_CONTAINERS: [&'static str; 3] = ["mp4", "webm", "mkv"];

    /// Parse the wire value. `video` alone means mp4.
    pub fn parse(raw: &str) -> Result<Self, RequestError> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "audio" | "mp3" => Ok(Self::Audio),
            "video" => Ok(Self::Video("mp4".to_string())),
            other if Self::VIDEO_CONTAINERS.contains(&other) => Ok(Self::Video(other.to_string())),
            _ => Err(RequestError::UnsupportedFormat(raw.to_string())),
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }
}

/// Immutable description of what to download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRequest {
    pub source_id: String,
    pub format: MediaFormat,
    pub quality: String,
    pub bitrate: String,
    pub title: String,
}

impl JobRequest {
    pub fn new(
        source_id: impl Into<String>,
        format: MediaFormat,
        quality: impl Into<String>,
        bitrate: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, RequestError> {
        let source_id = source_id.into().trim().to_string();
        if source_id.is_empty() {
            return Err(RequestError::MissingSourceId);
        }

        Ok(Self {
            source_id,
            format,
            quality: quality.into(),
            bitrate: bitrate.into(),
            title: title.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Allowed edges: Queued -> Downloading -> {Completed, Failed}.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Downloading)
                | (Self::Downloading, Self::Completed)
                | (Self::Downloading, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Queued => "Queued",
            Self::Downloading => "Downloading",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Diagnostic attached to a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub code: String,
    pub message: String,
}

/// One tracked download. Clones of this record are the snapshots handed out
/// to readers; only the owning worker mutates the registry copy.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadJob {
    pub id: JobId,
    pub request: JobRequest,
    pub status: JobStatus,
    pub progress: f64,
    pub output_path: Option<PathBuf>,
    pub output_size: Option<u64>,
    pub error: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DownloadJob {
    pub fn new(id: JobId, request: JobRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            request,
            status: JobStatus::Queued,
            progress: 0.0,
            output_path: None,
            output_size: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
