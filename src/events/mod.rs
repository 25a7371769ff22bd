//! Job event fan-out
//!
//! Workers report job changes to a [`JobObserver`]. The production observer
//! is the [`ProgressBridge`], which turns each change into a [`JobEvent`] and
//! hands it to the [`EventHub`] for delivery to every connected subscriber.

pub mod bridge;
pub mod hub;
pub mod sse;

use std::path::PathBuf;

use serde::Serialize;

use crate::queue::job::{DownloadJob, JobId, JobStatus};

pub use bridge::ProgressBridge;
pub use hub::{EventHub, HubError, Subscription};

/// Receives every state or progress change of a job, synchronously, from the
/// task that made it.
pub trait JobObserver: Send + Sync {
    fn job_updated(&self, job: &DownloadJob);
}

/// Observer that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl JobObserver for NoopObserver {
    fn job_updated(&self, _job: &DownloadJob) {}
}

/// Payload of one progress-stream frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(rename = "filePath", skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&DownloadJob> for JobEvent {
    fn from(job: &DownloadJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            file_path: job.output_path.clone(),
            error: job.error.as_ref().map(|failure| failure.message.clone()),
        }
    }
}
