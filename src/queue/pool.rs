use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::job::{DownloadJob, JobFailure, JobId, JobRequest};
use super::registry::{JobRegistry, RegistryStats};
use crate::config::{DownloaderConfig, QueueConfig};
use crate::events::JobObserver;
use crate::worker::WorkerDeps;
use crate::worker::runner;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("job {0} is already queued or running")]
    DuplicateJob(JobId),

    #[error("queue is shut down")]
    Closed,

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {0} has already finished")]
    AlreadyFinished(JobId),
}

/// Outcome of a non-blocking submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted(JobId),
    RejectedAtCapacity,
}

/// What travels through the channel from submitters to workers.
#[derive(Debug)]
pub struct QueuedJob {
    pub id: JobId,
    pub request: JobRequest,
    pub cancel: CancellationToken,
}

/// DownloadQueue runs submitted jobs on a fixed pool of workers
///
/// Architecture:
/// 1. Caller submits a request; a queue slot is reserved first
/// 2. The job is registered as `Queued` and sent through one bounded channel
/// 3. Workers share the receiving end and take jobs in FIFO order
/// 4. A full channel blocks `submit` (backpressure) or rejects `try_submit`
///
/// Jobs never share a worker: each worker runs one job at a time, and a
/// failing or panicking job is recorded and the worker moves on.
pub struct DownloadQueue {
    sender: mpsc::Sender<QueuedJob>,
    registry: Arc<JobRegistry>,
    observer: Arc<dyn JobObserver>,
    capacity: usize,
    num_workers: usize,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DownloadQueue {
    /// Build the channel and spawn `config.workers` workers.
    pub fn start(
        config: &QueueConfig,
        downloader: DownloaderConfig,
        observer: Arc<dyn JobObserver>,
    ) -> Result<Self, QueueError> {
        if config.workers == 0 {
            return Err(QueueError::NoWorkers);
        }

        info!(
            workers = config.workers,
            capacity = config.capacity,
            "Starting download queue"
        );

        let (mut queue, receiver) = Self::idle(config.capacity, observer);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let deps = queue.worker_deps(downloader);

        let workers = (0..config.workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    receiver.clone(),
                    deps.clone(),
                    queue.shutdown.clone(),
                ))
            })
            .collect();

        queue.num_workers = config.workers;
        queue.workers = Mutex::new(workers);
        Ok(queue)
    }

    /// Queue with no workers attached; the caller owns the receiving end.
    fn idle(capacity: usize, observer: Arc<dyn JobObserver>) -> (Self, mpsc::Receiver<QueuedJob>) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        let queue = Self {
            sender,
            registry: Arc::new(JobRegistry::new()),
            observer,
            capacity,
            num_workers: 0,
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        };
        (queue, receiver)
    }

    fn worker_deps(&self, downloader: DownloaderConfig) -> WorkerDeps {
        WorkerDeps {
            registry: self.registry.clone(),
            observer: self.observer.clone(),
            downloader: Arc::new(downloader),
        }
    }

    /// Enqueue a job, waiting for a free slot when the queue is full.
    pub async fn submit(&self, id: Option<JobId>, request: JobRequest) -> Result<JobId, QueueError> {
        let permit = self.sender.reserve().await.map_err(|_| QueueError::Closed)?;
        let queued = self.register(id, request)?;
        let id = queued.id.clone();
        permit.send(queued);
        Ok(id)
    }

    /// Enqueue a job only if a slot is free right now.
    pub fn try_submit(&self, id: Option<JobId>, request: JobRequest) -> Result<Admission, QueueError> {
        let permit = match self.sender.try_reserve() {
            Ok(permit) => permit,
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Queue at capacity, rejecting submission");
                return Ok(Admission::RejectedAtCapacity);
            }
            Err(mpsc::error::TrySendError::Closed(())) => return Err(QueueError::Closed),
        };

        let queued = self.register(id, request)?;
        let id = queued.id.clone();
        permit.send(queued);
        Ok(Admission::Accepted(id))
    }

    fn register(&self, id: Option<JobId>, request: JobRequest) -> Result<QueuedJob, QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }

        let id = id.unwrap_or_else(JobId::generate);
        let cancel = self.shutdown.child_token();
        let job = DownloadJob::new(id.clone(), request.clone());

        self.registry.insert(job.clone(), cancel.clone())?;
        debug!(job_id = %id, source_id = %request.source_id, "Job queued");
        self.observer.job_updated(&job);

        Ok(QueuedJob { id, request, cancel })
    }

    /// Snapshot of a job.
    pub fn status(&self, id: &JobId) -> Option<DownloadJob> {
        self.registry.get(id)
    }

    /// Request cancellation. Queued jobs fail when dequeued; running jobs
    /// have their process killed.
    pub fn cancel(&self, id: &JobId) -> Result<(), QueueError> {
        self.registry.cancel(id)
    }

    /// Jobs waiting in the channel.
    pub fn depth(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Cancel everything in flight and wait for the workers to exit.
    pub async fn shutdown(&self) {
        info!("Shutting down download queue");
        self.shutdown.cancel();

        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Download queue stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedJob>>>,
    deps: WorkerDeps,
    shutdown: CancellationToken,
) {
    debug!(worker_id, "Worker started");

    loop {
        let (queued, started) = {
            let mut receiver = receiver.lock().await;
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => None,
                next = receiver.recv() => next,
            };
            let Some(queued) = next else {
                break;
            };

            // Transition and notify while still holding the receiver so
            // Downloading order matches dequeue order.
            let started = deps.registry.begin(&queued.id);
            if let Some(job) = &started {
                deps.observer.job_updated(job);
            }
            (queued, started)
        };

        if started.is_none() {
            warn!(worker_id, job_id = %queued.id, "Dequeued job is not in Queued state, skipping");
            continue;
        }

        let id = queued.id.clone();
        let job_deps = deps.clone();
        let outcome =
            tokio::spawn(async move { runner::run_job(worker_id, queued, &job_deps).await }).await;

        if let Err(e) = outcome {
            error!(worker_id, job_id = %id, panicked = e.is_panic(), "Job task ended abnormally");
            let failure = JobFailure {
                code: "WORKER_PANIC".to_string(),
                message: "internal error while running job".to_string(),
            };
            if let Some(job) = deps.registry.fail(&id, failure) {
                deps.observer.job_updated(&job);
            }
        }
    }

    debug!(worker_id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopObserver;
    use crate::queue::job::{JobStatus, MediaFormat};
    use std::time::Duration;

    fn request(source: &str) -> JobRequest {
        JobRequest::new(source, MediaFormat::Audio, "", "192k", "Song").unwrap()
    }

    fn missing_tool() -> DownloaderConfig {
        DownloaderConfig {
            executable: Some("/nonexistent/mediabox-test-tool".to_string()),
            tool_name: "mediabox-test-tool-that-does-not-exist".to_string(),
            python_module: "mediabox_missing".to_string(),
            scratch_dir: std::env::temp_dir().join("mediabox-pool-tests"),
            ..DownloaderConfig::default()
        }
    }

    fn queue(workers: usize, capacity: usize) -> DownloadQueue {
        let config = QueueConfig {
            workers,
            capacity,
            ..QueueConfig::default()
        };
        DownloadQueue::start(&config, missing_tool(), Arc::new(NoopObserver)).unwrap()
    }

    async fn wait_terminal(queue: &DownloadQueue, id: &JobId) -> DownloadJob {
        for _ in 0..500 {
            if let Some(job) = queue.status(id) {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never finished");
    }

    #[tokio::test]
    async fn test_zero_workers_is_fatal() {
        let config = QueueConfig {
            workers: 0,
            ..QueueConfig::default()
        };
        let result = DownloadQueue::start(&config, missing_tool(), Arc::new(NoopObserver));
        assert!(matches!(result, Err(QueueError::NoWorkers)));
    }

    #[tokio::test]
    async fn test_failed_job_does_not_stop_worker() {
        let queue = queue(1, 4);

        let first = queue.submit(None, request("a")).await.unwrap();
        let second = queue.submit(None, request("b")).await.unwrap();

        let first = wait_terminal(&queue, &first).await;
        let second = wait_terminal(&queue, &second).await;

        // Depending on the host this is either no executable at all or an
        // interpreter without the module; both must fail the job.
        assert_eq!(first.status, JobStatus::Failed);
        assert!(!first.error.unwrap().message.is_empty());
        assert_eq!(second.status, JobStatus::Failed);

        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_id_rejected() {
        let (queue, _receiver) = DownloadQueue::idle(4, Arc::new(NoopObserver));
        let id = JobId::parse("dup").unwrap();

        queue.submit(Some(id.clone()), request("a")).await.unwrap();
        let result = queue.submit(Some(id.clone()), request("b")).await;

        assert_eq!(result, Err(QueueError::DuplicateJob(id.clone())));
        assert_eq!(queue.status(&id).unwrap().request.source_id, "a");
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn test_try_submit_rejects_at_capacity() {
        let (queue, _receiver) = DownloadQueue::idle(1, Arc::new(NoopObserver));

        let first = queue.try_submit(None, request("a")).unwrap();
        assert!(matches!(first, Admission::Accepted(_)));
        assert_eq!(queue.depth(), 1);

        let second = queue.try_submit(None, request("b")).unwrap();
        assert_eq!(second, Admission::RejectedAtCapacity);

        // The rejected request left nothing behind
        assert_eq!(queue.stats().queued, 1);
    }

    #[tokio::test]
    async fn test_submit_blocks_until_slot_frees() {
        let (queue, mut receiver) = DownloadQueue::idle(1, Arc::new(NoopObserver));
        let first = queue.submit(None, request("a")).await.unwrap();

        let blocked = queue.submit(None, request("b"));
        tokio::pin!(blocked);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut blocked)
                .await
                .is_err()
        );
        // Nothing is registered while the caller waits for a slot
        assert_eq!(queue.stats().queued, 1);

        let head = receiver.recv().await.unwrap();
        assert_eq!(head.id, first);

        let second = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(receiver.recv().await.unwrap().id, second);
        assert_eq!(queue.stats().queued, 2);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_closed() {
        let (queue, _receiver) = DownloadQueue::idle(4, Arc::new(NoopObserver));
        queue.shutdown().await;

        let result = queue.submit(None, request("a")).await;
        assert_eq!(result, Err(QueueError::Closed));
        assert!(!queue.is_running());
    }

    #[tokio::test]
    async fn test_cancel_queued_job_fails_without_spawning() {
        let (queue, receiver) = DownloadQueue::idle(4, Arc::new(NoopObserver));
        let id = queue.submit(None, request("a")).await.unwrap();

        queue.cancel(&id).unwrap();
        assert_eq!(
            queue.cancel(&JobId::parse("nope").unwrap()),
            Err(QueueError::NotFound(JobId::parse("nope").unwrap()))
        );

        let deps = queue.worker_deps(missing_tool());
        let worker = tokio::spawn(worker_loop(
            0,
            Arc::new(tokio::sync::Mutex::new(receiver)),
            deps,
            queue.shutdown.clone(),
        ));

        let job = wait_terminal(&queue, &id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.unwrap().code, "CANCELLED");
        assert_eq!(queue.cancel(&id), Err(QueueError::AlreadyFinished(id.clone())));

        queue.shutdown().await;
        worker.await.unwrap();
    }
}
