use crate::downloader::ProgressBand;
use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// HTTP adapter configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Largest accepted submission body
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(64 * 1024)
}

/// What the HTTP adapter does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPolicy {
    /// Wait for a free slot.
    #[default]
    Block,
    /// Answer 503 immediately.
    Reject,
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub admission: AdmissionPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            capacity: default_capacity(),
            admission: AdmissionPolicy::default(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_capacity() -> usize {
    64
}

/// External downloader configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloaderConfig {
    /// Explicit override: a path, or a command name looked up on PATH
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default = "default_tool_name")]
    pub tool_name: String,
    /// Module run as `python -m <module>` when the tool is not on PATH
    #[serde(default = "default_python_module")]
    pub python_module: String,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default = "default_progress_floor")]
    pub progress_floor: f64,
    #[serde(default = "default_progress_ceiling")]
    pub progress_ceiling: f64,
}

impl DownloaderConfig {
    pub fn band(&self) -> ProgressBand {
        ProgressBand::new(self.progress_floor, self.progress_ceiling)
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            executable: None,
            tool_name: default_tool_name(),
            python_module: default_python_module(),
            scratch_dir: default_scratch_dir(),
            progress_floor: default_progress_floor(),
            progress_ceiling: default_progress_ceiling(),
        }
    }
}

fn default_tool_name() -> String {
    "yt-dlp".to_string()
}

fn default_python_module() -> String {
    "yt_dlp".to_string()
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("data/scratch")
}

fn default_progress_floor() -> f64 {
    25.0
}

fn default_progress_ceiling() -> f64 {
    95.0
}

/// Progress stream configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// Per-subscriber sink capacity
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,
    /// Seconds between keep-alive comments, 0 disables them
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl EventsConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            client_buffer: default_client_buffer(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

fn default_client_buffer() -> usize {
    32
}

fn default_keep_alive_secs() -> u64 {
    15
}
