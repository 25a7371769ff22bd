use std::sync::Arc;

use tracing::debug;

use super::hub::EventHub;
use super::{JobEvent, JobObserver};
use crate::observability::Metrics;
use crate::queue::job::{DownloadJob, JobStatus};

/// Forwards every job change to the hub as a [`JobEvent`], one broadcast per
/// callback, without buffering or coalescing.
#[derive(Clone)]
pub struct ProgressBridge {
    hub: EventHub,
    metrics: Arc<Metrics>,
}

impl ProgressBridge {
    pub fn new(hub: EventHub, metrics: Arc<Metrics>) -> Self {
        Self { hub, metrics }
    }
}

impl JobObserver for ProgressBridge {
    fn job_updated(&self, job: &DownloadJob) {
        match job.status {
            JobStatus::Completed => self.metrics.job_completed(),
            JobStatus::Failed => self.metrics.job_failed(),
            JobStatus::Queued | JobStatus::Downloading => {}
        }

        debug!(job_id = %job.id, status = %job.status, progress = job.progress, "Publishing job event");
        self.hub.broadcast_json(&JobEvent::from(job));
    }
}
