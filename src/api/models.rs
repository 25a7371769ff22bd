//! Wire types for the job and health endpoints.
//!
//! A submission to `POST /jobs`:
//!
//! ```json
//! {
//!   "id": "optional-caller-id",
//!   "sourceID": "abc123",
//!   "format": "audio",
//!   "quality": "720p",
//!   "bitrate": "192k",
//!   "title": "Song"
//! }
//! ```
//!
//! Only `sourceID` and `format` are required.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::observability::MetricsSnapshot;
use crate::queue::{DownloadJob, JobFailure, JobId, JobStatus, RegistryStats};

#[derive(Debug, Deserialize, Clone)]
pub struct SubmitJobRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "sourceID")]
    pub source_id: String,
    pub format: String,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub bitrate: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobAcceptedResponse {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DownloadJob> for JobStatusResponse {
    fn from(job: DownloadJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            file_path: job.output_path,
            file_size: job.output_size,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct QueueHealth {
    pub workers: usize,
    pub capacity: usize,
    pub depth: usize,
    pub jobs: RegistryStats,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub version: String,
    pub queue: QueueHealth,
    pub subscribers: usize,
    pub metrics: MetricsSnapshot,
}
