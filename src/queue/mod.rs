pub mod job;
pub mod pool;
pub mod registry;

pub use job::{DownloadJob, JobFailure, JobId, JobRequest, JobStatus, MediaFormat, RequestError};
pub use pool::{Admission, DownloadQueue, QueueError, QueuedJob};
pub use registry::{JobRegistry, RegistryStats};
