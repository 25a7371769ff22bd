//! External downloader process management
//!
//! One [`DownloaderProcess`] wraps one invocation of the external tool:
//! executable resolution, argument building, progress extraction from its
//! output, and resolution of the artifact it leaves in the scratch directory.

pub mod args;
pub mod artifact;
pub mod process;
pub mod progress;
pub mod resolve;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub use artifact::Artifact;
pub use process::DownloaderProcess;
pub use progress::ProgressBand;
pub use resolve::{Invocation, resolve_executable};

/// Receives progress already rescaled into the configured band.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("downloader executable not found (tried: {tried})")]
    ExecutableNotFound { tried: String },

    #[error("failed to start downloader: {0}")]
    ProcessStartFailed(#[source] std::io::Error),

    #[error("downloader exited with {status}: {stderr_tail}")]
    ProcessExitedNonZero { status: String, stderr_tail: String },

    #[error("no artifact matching '{prefix}*' in {}", .dir.display())]
    ArtifactNotFound { dir: PathBuf, prefix: String },

    #[error("failed to stat artifact {}: {source}", .path.display())]
    StatFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("scratch directory {} unavailable: {source}", .path.display())]
    ScratchDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("downloader i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub fn code(&self) -> &'static str {
        match self {
            DownloadError::ExecutableNotFound { .. } => "EXECUTABLE_NOT_FOUND",
            DownloadError::ProcessStartFailed(_) => "PROCESS_START_FAILED",
            DownloadError::ProcessExitedNonZero { .. } => "PROCESS_EXITED_NON_ZERO",
            DownloadError::ArtifactNotFound { .. } => "ARTIFACT_NOT_FOUND",
            DownloadError::StatFailed { .. } => "STAT_FAILED",
            DownloadError::ScratchDir { .. } => "SCRATCH_DIR_UNAVAILABLE",
            DownloadError::Io(_) => "IO_ERROR",
            DownloadError::Cancelled => "CANCELLED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_error_carries_tail() {
        let err = DownloadError::ProcessExitedNonZero {
            status: "exit status: 1".to_string(),
            stderr_tail: "ERROR: Video unavailable".to_string(),
        };
        assert_eq!(err.code(), "PROCESS_EXITED_NON_ZERO");
        assert!(err.to_string().contains("Video unavailable"));
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert_eq!(DownloadError::Cancelled.code(), "CANCELLED");
        assert_ne!(
            DownloadError::Cancelled.code(),
            DownloadError::ProcessExitedNonZero {
                status: String::new(),
                stderr_tail: String::new(),
            }
            .code()
        );
    }
}
