//! Job runner - executes one dequeued job to a terminal state

use std::sync::Arc;

use tracing::{info, warn};

use super::WorkerDeps;
use crate::downloader::{DownloadError, DownloaderProcess, ProgressCallback};
use crate::humanize::ByteSize;
use crate::queue::job::{JobFailure, JobId};
use crate::queue::QueuedJob;

/// Drive the job's downloader process and record Completed or Failed.
///
/// The job must already be `Downloading`. Errors never escape: they end up
/// on the job record and in the observer stream.
pub async fn run_job(worker_id: usize, queued: QueuedJob, deps: &WorkerDeps) {
    let QueuedJob { id, request, cancel } = queued;

    info!(
        worker_id,
        job_id = %id,
        source_id = %request.source_id,
        format = ?request.format,
        "Starting download"
    );

    if cancel.is_cancelled() {
        finish_failed(worker_id, &id, &DownloadError::Cancelled, deps);
        return;
    }

    let on_progress = progress_callback(&id, deps);
    let result = match DownloaderProcess::start(
        id.as_str(),
        &request,
        &deps.downloader,
        on_progress,
        cancel,
    )
    .await
    {
        Ok(process) => process.wait().await.and_then(|()| {
            process.artifact().ok_or_else(|| {
                DownloadError::Io(std::io::Error::other("downloader finished without an artifact"))
            })
        }),
        Err(e) => Err(e),
    };

    match result {
        Ok(artifact) => {
            info!(
                worker_id,
                job_id = %id,
                path = %artifact.path.display(),
                size = %ByteSize(artifact.size),
                "Download completed"
            );
            if let Some(job) = deps.registry.complete(&id, artifact.path, artifact.size) {
                deps.observer.job_updated(&job);
            }
        }
        Err(e) => finish_failed(worker_id, &id, &e, deps),
    }
}

fn progress_callback(id: &JobId, deps: &WorkerDeps) -> ProgressCallback {
    let id = id.clone();
    let registry = deps.registry.clone();
    let observer = deps.observer.clone();

    Arc::new(move |progress| {
        if let Some(job) = registry.record_progress(&id, progress) {
            observer.job_updated(&job);
        }
    })
}

fn finish_failed(worker_id: usize, id: &JobId, error: &DownloadError, deps: &WorkerDeps) {
    warn!(worker_id, job_id = %id, code = error.code(), error = %error, "Download failed");

    let failure = JobFailure {
        code: error.code().to_string(),
        message: error.to_string(),
    };
    if let Some(job) = deps.registry.fail(id, failure) {
        deps.observer.job_updated(&job);
    }
}
