//! Download worker
//!
//! Each pool worker takes one [`QueuedJob`](crate::queue::QueuedJob) at a
//! time and hands it to [`runner::run_job`], which drives the external
//! downloader and records the outcome.

pub mod runner;

use std::sync::Arc;

use crate::config::DownloaderConfig;
use crate::events::JobObserver;
use crate::queue::JobRegistry;

/// Everything a worker needs, shared by all workers of one pool.
#[derive(Clone)]
pub struct WorkerDeps {
    pub registry: Arc<JobRegistry>,
    pub observer: Arc<dyn JobObserver>,
    pub downloader: Arc<DownloaderConfig>,
}
