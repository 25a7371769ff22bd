use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::job::{DownloadJob, JobFailure, JobId, JobStatus};
use super::pool::QueueError;

struct JobEntry {
    job: DownloadJob,
    cancel: CancellationToken,
}

/// Counts of jobs per status, for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    pub queued: usize,
    pub downloading: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Arena of jobs addressed by id.
///
/// Readers get snapshot copies. Writes happen only from the worker owning a
/// job (plus the initial insert on submission), and every write goes through
/// [`JobStatus::can_transition_to`], so terminal states stay terminal.
///
/// A std `RwLock` is used rather than the async one because progress updates
/// arrive from synchronous callbacks; no guard is ever held across an await.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly submitted job. An id may be reused once the
    /// previous job under it reached a terminal state.
    pub fn insert(&self, job: DownloadJob, cancel: CancellationToken) -> Result<(), QueueError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = jobs.get(&job.id) {
            if !existing.job.status.is_terminal() {
                return Err(QueueError::DuplicateJob(job.id.clone()));
            }
        }

        jobs.insert(job.id.clone(), JobEntry { job, cancel });
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> Option<DownloadJob> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).map(|entry| entry.job.clone())
    }

    pub fn cancel_token(&self, id: &JobId) -> Option<CancellationToken> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).map(|entry| entry.cancel.clone())
    }

    /// Request cancellation of a job that has not finished yet.
    pub fn cancel(&self, id: &JobId) -> Result<(), QueueError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let entry = jobs
            .get(id)
            .ok_or_else(|| QueueError::NotFound(id.clone()))?;

        if entry.job.status.is_terminal() {
            return Err(QueueError::AlreadyFinished(id.clone()));
        }

        entry.cancel.cancel();
        debug!(job_id = %id, status = %entry.job.status, "Cancellation requested");
        Ok(())
    }

    /// Queued -> Downloading.
    pub fn begin(&self, id: &JobId) -> Option<DownloadJob> {
        self.transition(id, JobStatus::Downloading, |_| {})
    }

    /// Record rescaled progress. Returns the current snapshot while the job
    /// is downloading; recorded progress never decreases.
    pub fn record_progress(&self, id: &JobId, progress: f64) -> Option<DownloadJob> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let entry = jobs.get_mut(id)?;

        if entry.job.status != JobStatus::Downloading {
            return None;
        }

        let progress = progress.clamp(0.0, 100.0);
        if progress > entry.job.progress {
            entry.job.progress = progress;
            entry.job.updated_at = Utc::now();
        }

        Some(entry.job.clone())
    }

    /// Downloading -> Completed.
    pub fn complete(&self, id: &JobId, path: PathBuf, size: u64) -> Option<DownloadJob> {
        self.transition(id, JobStatus::Completed, |job| {
            job.progress = 100.0;
            job.output_path = Some(path);
            job.output_size = Some(size);
        })
    }

    /// Downloading -> Failed.
    pub fn fail(&self, id: &JobId, failure: JobFailure) -> Option<DownloadJob> {
        self.transition(id, JobStatus::Failed, |job| {
            job.error = Some(failure);
        })
    }

    pub fn stats(&self) -> RegistryStats {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut stats = RegistryStats::default();
        for entry in jobs.values() {
            match entry.job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Downloading => stats.downloading += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    fn transition(
        &self,
        id: &JobId,
        next: JobStatus,
        apply: impl FnOnce(&mut DownloadJob),
    ) -> Option<DownloadJob> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let entry = jobs.get_mut(id)?;

        if !entry.job.status.can_transition_to(next) {
            warn!(
                job_id = %id,
                from = %entry.job.status,
                to = %next,
                "Rejected invalid job transition"
            );
            return None;
        }

        entry.job.status = next;
        entry.job.updated_at = Utc::now();
        apply(&mut entry.job);

        debug!(job_id = %id, status = %next, "Job transitioned");
        Some(entry.job.clone())
    }
}
