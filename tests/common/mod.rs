#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use mediabox::config::{AdmissionPolicy, Config};
use mediabox::queue::{DownloadJob, JobStatus};
use tempfile::TempDir;

/// Stand-in for the real downloader. Behaviour depends on the source id
/// (the last argument):
/// - `broken`: prints an error on stderr and exits 1
/// - `slow*`: writes a partial file and sleeps
/// - anything else: prints progress and writes a 500000-byte `.mp3`
const FAKE_DOWNLOADER: &str = r#"#!/bin/sh
out=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    --) src="$2"; break ;;
  esac
  shift
done
file=$(printf '%s' "$out" | sed 's/%(ext)s/mp3/')

case "$src" in
  broken)
    echo "[youtube] $src: Downloading webpage"
    echo "ERROR: [youtube] $src: Video unavailable" >&2
    exit 1
    ;;
  slow*)
    echo '[download]  10.0% of 1.00MiB'
    printf 'partial' > "$file.part"
    exec sleep 30
    ;;
esac

echo '[download]  10.0% of 1.00MiB'
echo '[download]  50.0% of 1.00MiB'
echo '[download] 100.0% of 1.00MiB'
head -c 500000 /dev/zero > "$file"
"#;

pub struct TestEnv {
    pub config: Config,
    pub temp_dir: TempDir,
}

impl TestEnv {
    pub fn scratch_dir(&self) -> PathBuf {
        self.temp_dir.path().join("scratch")
    }
}

#[cfg(unix)]
fn write_fake_downloader(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-downloader.sh");
    std::fs::write(&path, FAKE_DOWNLOADER).expect("Failed to write fake downloader");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to mark fake downloader executable");
    path
}

#[cfg(not(unix))]
fn write_fake_downloader(dir: &Path) -> PathBuf {
    dir.join("fake-downloader-unavailable")
}

/// Config pointing the downloader at the fake script and an isolated
/// scratch directory.
pub fn test_env(workers: usize, capacity: usize, admission: AdmissionPolicy) -> TestEnv {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let script = write_fake_downloader(temp_dir.path());

    let mut config = Config::default();
    config.queue.workers = workers;
    config.queue.capacity = capacity;
    config.queue.admission = admission;
    config.downloader.executable = Some(script.to_string_lossy().into_owned());
    config.downloader.scratch_dir = temp_dir.path().join("scratch");
    config.events.keep_alive_secs = 0;

    TestEnv { config, temp_dir }
}

/// Poll `probe` until it yields a job in a terminal state.
pub async fn wait_for_terminal<F>(mut probe: F) -> DownloadJob
where
    F: FnMut() -> Option<DownloadJob>,
{
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            if let Some(job) = probe() {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Job did not finish in time")
}

/// Poll `probe` until the job reports `status`.
pub async fn wait_for_status<F>(mut probe: F, status: JobStatus) -> DownloadJob
where
    F: FnMut() -> Option<DownloadJob>,
{
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            if let Some(job) = probe() {
                if job.status == status {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Job did not reach the expected status in time")
}
