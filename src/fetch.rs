use tokio_util::sync::CancellationToken;
use tracing::info;

use mediabox::config::Config;
use mediabox::downloader::{DownloaderProcess, ProgressCallback};
use mediabox::humanize::ByteSize;
use mediabox::queue::{JobId, JobRequest, MediaFormat};

use crate::cli::FetchArgs;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Run one download in the foreground. Ctrl+C cancels it.
pub async fn run(config: Config, args: FetchArgs) -> Result<(), AnyError> {
    let format = MediaFormat::parse(&args.format)?;
    let request = JobRequest::new(args.source, format, args.quality, args.bitrate, args.title)?;
    let id = JobId::generate();

    let on_progress: ProgressCallback = std::sync::Arc::new(|progress: f64| {
        eprintln!("progress {progress:5.1}%");
    });

    let cancel = CancellationToken::new();
    let process =
        DownloaderProcess::start(id.as_str(), &request, &config.downloader, on_progress, cancel.clone())
            .await?;
    info!(job_id = %id, pid = ?process.pid(), "Fetching");

    let outcome = tokio::select! {
        outcome = process.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            process.wait().await
        }
    };
    outcome?;

    if let Some(artifact) = process.artifact() {
        println!("{}\t{}", artifact.path.display(), ByteSize(artifact.size));
    }
    Ok(())
}
