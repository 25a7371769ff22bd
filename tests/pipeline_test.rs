//! Queue, worker, downloader and event hub working together against a fake
//! downloader script.
#![cfg(unix)]

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use mediabox::api::state::AppState;
use mediabox::config::AdmissionPolicy;
use mediabox::events::JobObserver;
use mediabox::queue::{DownloadJob, DownloadQueue, JobId, JobRequest, JobStatus, MediaFormat};

use common::test_env;

fn audio(source_id: &str, title: &str) -> JobRequest {
    JobRequest::new(source_id, MediaFormat::Audio, "", "192k", title).unwrap()
}

/// Records the order in which jobs start downloading.
#[derive(Default)]
struct StartOrder {
    started: Mutex<Vec<JobId>>,
}

impl JobObserver for StartOrder {
    fn job_updated(&self, job: &DownloadJob) {
        if job.status == JobStatus::Downloading && job.progress == 0.0 {
            self.started.lock().unwrap().push(job.id.clone());
        }
    }
}

#[tokio::test]
async fn test_completed_job_streams_rescaled_progress() {
    let env = test_env(2, 8, AdmissionPolicy::Block);
    let state = AppState::start(env.config.clone()).unwrap();
    let mut subscription = state.hub.add_client().await.unwrap();

    let id = JobId::parse("j1").unwrap();
    state
        .queue
        .submit(Some(id.clone()), audio("abc123", "Song"))
        .await
        .unwrap();

    let mut frames = Vec::new();
    tokio::time::timeout(Duration::from_secs(15), async {
        while let Some(message) = subscription.receiver.recv().await {
            let frame: Value = serde_json::from_str(&message).unwrap();
            let done = frame["status"] == "Completed" || frame["status"] == "Failed";
            frames.push(frame);
            if done {
                break;
            }
        }
    })
    .await
    .expect("No terminal event received");

    assert!(frames.iter().all(|frame| frame["jobID"] == "j1"));
    assert_eq!(frames[0]["status"], "Queued");

    let progress: Vec<f64> = frames
        .iter()
        .filter(|frame| frame["status"] == "Downloading")
        .map(|frame| frame["progress"].as_f64().unwrap())
        .filter(|progress| *progress > 0.0)
        .collect();
    assert_eq!(progress, vec![32.0, 60.0, 95.0]);

    let last = frames.last().unwrap();
    assert_eq!(last["status"], "Completed");
    assert_eq!(last["progress"], 100.0);
    assert!(last["filePath"].as_str().unwrap().ends_with("Song_abc123.mp3"));

    let job = state.queue.status(&id).unwrap();
    assert_eq!(job.output_size, Some(500_000));
    assert_eq!(
        job.output_path.unwrap(),
        env.scratch_dir().join("Song_abc123.mp3")
    );
    assert_eq!(state.metrics.snapshot().jobs_completed, 1);

    state.shutdown().await;
}

#[tokio::test]
async fn test_failed_job_does_not_stop_worker() {
    let env = test_env(1, 8, AdmissionPolicy::Block);
    let state = AppState::start(env.config.clone()).unwrap();

    let broken = state.queue.submit(None, audio("broken", "Bad")).await.unwrap();
    let healthy = state.queue.submit(None, audio("xyz789", "Fine")).await.unwrap();

    let failed = common::wait_for_terminal(|| state.queue.status(&broken)).await;
    assert_eq!(failed.status, JobStatus::Failed);
    let failure = failed.error.unwrap();
    assert_eq!(failure.code, "PROCESS_EXITED_NON_ZERO");
    assert!(failure.message.contains("Video unavailable"));

    let completed = common::wait_for_terminal(|| state.queue.status(&healthy)).await;
    assert_eq!(completed.status, JobStatus::Completed);
    assert_eq!(completed.progress, 100.0);

    state.shutdown().await;
}

#[tokio::test]
async fn test_jobs_start_in_submission_order() {
    let env = test_env(2, 16, AdmissionPolicy::Block);
    let observer = Arc::new(StartOrder::default());
    let queue = DownloadQueue::start(
        &env.config.queue,
        env.config.downloader.clone(),
        observer.clone(),
    )
    .unwrap();

    let mut ids = Vec::new();
    for i in 0..6 {
        let id = JobId::parse(&format!("job-{i}")).unwrap();
        queue
            .submit(Some(id.clone()), audio(&format!("src{i}"), "Track"))
            .await
            .unwrap();
        ids.push(id);
    }

    for id in &ids {
        let job = common::wait_for_terminal(|| queue.status(id)).await;
        assert_eq!(job.status, JobStatus::Completed);
    }

    assert_eq!(*observer.started.lock().unwrap(), ids);

    queue.shutdown().await;
}

#[tokio::test]
async fn test_cancel_in_flight_job() {
    let env = test_env(1, 8, AdmissionPolicy::Block);
    let state = AppState::start(env.config.clone()).unwrap();

    let running = state.queue.submit(None, audio("slow-a", "Long")).await.unwrap();
    let waiting = state.queue.submit(None, audio("slow-b", "Later")).await.unwrap();

    common::wait_for_status(|| state.queue.status(&running), JobStatus::Downloading).await;
    assert_eq!(state.queue.status(&waiting).unwrap().status, JobStatus::Queued);

    state.queue.cancel(&waiting).unwrap();
    state.queue.cancel(&running).unwrap();

    let cancelled = common::wait_for_terminal(|| state.queue.status(&running)).await;
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.error.unwrap().code, "CANCELLED");

    let skipped = common::wait_for_terminal(|| state.queue.status(&waiting)).await;
    assert_eq!(skipped.error.unwrap().code, "CANCELLED");

    // Partial output of the killed process is cleaned up
    let leftovers: Vec<_> = std::fs::read_dir(env.scratch_dir())
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.file_name()).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");

    state.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_ends_event_streams() {
    let env = test_env(1, 8, AdmissionPolicy::Block);
    let state = AppState::start(env.config.clone()).unwrap();
    let mut subscription = state.hub.add_client().await.unwrap();

    state.shutdown().await;

    let ended = tokio::time::timeout(Duration::from_secs(5), subscription.receiver.recv())
        .await
        .expect("Stream still open after shutdown");
    assert!(ended.is_none());
    assert!(!state.queue.is_running());
}
