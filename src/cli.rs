use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "mediabox")]
#[command(about = "Media download service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server with the download queue and event stream
    Server(ServerArgs),
    /// Download one item in the foreground, without the queue
    Fetch(FetchArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Source identifier handed to the downloader (URL or site id)
    #[arg(long)]
    pub source: String,

    /// audio, video, mp4, webm or mkv
    #[arg(long, default_value = "audio")]
    pub format: String,

    /// Video quality, e.g. 720p or "high"
    #[arg(long, default_value = "")]
    pub quality: String,

    /// Audio bitrate, e.g. 192k
    #[arg(long, default_value = "")]
    pub bitrate: String,

    /// Title used for the output file name
    #[arg(long, default_value = "")]
    pub title: String,
}
