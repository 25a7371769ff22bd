//! One managed invocation of the external downloader.
//!
//! `start` spawns the tool and hands the child to a monitor task. Scanners
//! read stdout and stderr line by line; progress comes from stdout only and
//! every other line feeds the diagnostic tail. The monitor races the exit
//! against cancellation and resolves the artifact on success. The outcome is
//! published once; [`DownloaderProcess::wait`] observes it.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::args::build_args;
use super::artifact::{self, Artifact, output_stem, output_template};
use super::progress::{ProgressBand, parse_percent};
use super::resolve::resolve_executable;
use super::{DownloadError, ProgressCallback};
use crate::config::DownloaderConfig;
use crate::queue::job::JobRequest;

/// Lines of non-progress output kept for failure diagnostics.
const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// How long to wait for the output scanners once the child has exited.
/// Grandchildren (e.g. ffmpeg) can hold the pipes open a little longer.
const SCANNER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

type DiagnosticTail = Arc<Mutex<VecDeque<String>>>;

pub struct DownloaderProcess {
    label: String,
    pid: Option<u32>,
    resolved: Arc<RwLock<Option<Artifact>>>,
    outcome: Arc<Mutex<Option<Result<(), DownloadError>>>>,
    done: watch::Receiver<bool>,
}

impl DownloaderProcess {
    /// Resolve the executable, spawn it and start monitoring.
    ///
    /// `label` only tags log lines (normally the job id).
    pub async fn start(
        label: impl Into<String>,
        request: &JobRequest,
        config: &DownloaderConfig,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<Self, DownloadError> {
        let label = label.into();
        let invocation = resolve_executable(config)?;

        tokio::fs::create_dir_all(&config.scratch_dir)
            .await
            .map_err(|source| DownloadError::ScratchDir {
                path: config.scratch_dir.clone(),
                source,
            })?;

        let stem = output_stem(&request.title, &request.source_id);
        let template = output_template(&config.scratch_dir, &stem);
        let preexisting = artifact::existing_files(&config.scratch_dir, &stem).await;

        let mut child = Command::new(&invocation.program)
            .args(&invocation.leading_args)
            .args(build_args(request, &template))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("PYTHONUNBUFFERED", "1")
            .kill_on_drop(true)
            .spawn()
            .map_err(DownloadError::ProcessStartFailed)?;

        let pid = child.id();
        info!(
            job_id = %label,
            pid,
            program = %invocation.program.display(),
            source_id = %request.source_id,
            "Downloader started"
        );

        let tail: DiagnosticTail = Arc::new(Mutex::new(VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES)));
        let band = config.band();

        let mut scanners = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            scanners.push(spawn_scanner(stdout, label.clone(), band, Some(on_progress), tail.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            scanners.push(spawn_scanner(stderr, label.clone(), band, None, tail.clone()));
        }

        let (done_tx, done) = watch::channel(false);
        let resolved = Arc::new(RwLock::new(None));
        let outcome = Arc::new(Mutex::new(None));

        let monitor = Monitor {
            label: label.clone(),
            scratch_dir: config.scratch_dir.clone(),
            stem,
            preexisting,
            cancel,
            tail,
            resolved: resolved.clone(),
        };
        let outcome_slot = outcome.clone();

        tokio::spawn(async move {
            let result = monitor.supervise(child, scanners).await;
            *outcome_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
            let _ = done_tx.send(true);
        });

        Ok(Self {
            label,
            pid,
            resolved,
            outcome,
            done,
        })
    }

    /// Block until the process exited and post-processing finished.
    ///
    /// The outcome is handed out once; later calls return `Ok(())`
    /// immediately.
    pub async fn wait(&self) -> Result<(), DownloadError> {
        let mut done = self.done.clone();
        let finished = done.wait_for(|finished| *finished).await.is_ok();

        let outcome = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match outcome {
            Some(result) => result,
            None if finished => Ok(()),
            None => Err(DownloadError::Io(std::io::Error::other(
                "downloader monitor ended without a result",
            ))),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.artifact().map(|artifact| artifact.path)
    }

    pub fn file_size(&self) -> Option<u64> {
        self.artifact().map(|artifact| artifact.size)
    }

    pub fn artifact(&self) -> Option<Artifact> {
        self.resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct Monitor {
    label: String,
    scratch_dir: PathBuf,
    stem: String,
    /// Matching files present before spawn; cancellation leaves them alone.
    preexisting: HashSet<PathBuf>,
    cancel: CancellationToken,
    tail: DiagnosticTail,
    resolved: Arc<RwLock<Option<Artifact>>>,
}

impl Monitor {
    async fn supervise(
        &self,
        mut child: Child,
        scanners: Vec<JoinHandle<()>>,
    ) -> Result<(), DownloadError> {
        // Natural exit wins when both are ready.
        let status = tokio::select! {
            biased;
            status = child.wait() => status?,
            () = self.cancel.cancelled() => {
                return self.terminate(child, scanners).await;
            }
        };

        drain(scanners).await;

        if !status.success() {
            let stderr_tail = self.diagnostic_tail(status);
            warn!(job_id = %self.label, %status, tail = %stderr_tail, "Downloader exited with failure");
            return Err(DownloadError::ProcessExitedNonZero {
                status: status.to_string(),
                stderr_tail,
            });
        }

        let artifact = artifact::find_artifact(&self.scratch_dir, &self.stem).await?;
        info!(
            job_id = %self.label,
            path = %artifact.path.display(),
            size = artifact.size,
            "Artifact resolved"
        );
        *self.resolved.write().unwrap_or_else(PoisonError::into_inner) = Some(artifact);

        Ok(())
    }

    async fn terminate(
        &self,
        mut child: Child,
        scanners: Vec<JoinHandle<()>>,
    ) -> Result<(), DownloadError> {
        // start_kill on an already reaped child errors; that race is harmless.
        if let Err(e) = child.start_kill() {
            debug!(job_id = %self.label, error = %e, "Kill after exit ignored");
        }
        if let Err(e) = child.wait().await {
            debug!(job_id = %self.label, error = %e, "Reaping cancelled downloader failed");
        }
        drain(scanners).await;

        let removed = artifact::remove_partials(&self.scratch_dir, &self.stem, &self.preexisting).await;
        info!(job_id = %self.label, removed, "Downloader cancelled");

        Err(DownloadError::Cancelled)
    }

    fn diagnostic_tail(&self, status: ExitStatus) -> String {
        let tail = self.tail.lock().unwrap_or_else(PoisonError::into_inner);
        if tail.is_empty() {
            format!("no diagnostic output ({status})")
        } else {
            tail.iter().cloned().collect::<Vec<_>>().join("\n")
        }
    }
}

async fn drain(scanners: Vec<JoinHandle<()>>) {
    for scanner in scanners {
        let abort = scanner.abort_handle();
        if tokio::time::timeout(SCANNER_DRAIN_TIMEOUT, scanner).await.is_err() {
            abort.abort();
        }
    }
}

fn spawn_scanner<R>(
    reader: R,
    label: String,
    band: ProgressBand,
    on_progress: Option<ProgressCallback>,
    tail: DiagnosticTail,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => handle_line(&line, &label, band, on_progress.as_ref(), &tail),
                Ok(None) => break,
                Err(e) => {
                    debug!(job_id = %label, error = %e, "Downloader output stream failed");
                    break;
                }
            }
        }
    })
}

fn handle_line(
    line: &str,
    label: &str,
    band: ProgressBand,
    on_progress: Option<&ProgressCallback>,
    tail: &DiagnosticTail,
) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    if let Some(raw) = parse_percent(line) {
        // Only stdout reports progress, so callbacks arrive in line order.
        if let Some(on_progress) = on_progress {
            let scaled = band.rescale(raw);
            debug!(job_id = %label, raw, scaled, "Downloader progress");
            on_progress(scaled);
        }
        return;
    }

    debug!(job_id = %label, line, "Downloader output");
    let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
    if tail.len() == DIAGNOSTIC_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line.to_string());
}
