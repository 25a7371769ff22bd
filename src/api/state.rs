use std::sync::Arc;

use crate::config::Config;
use crate::events::{EventHub, ProgressBridge};
use crate::observability::Metrics;
use crate::queue::{DownloadQueue, QueueError};

/// Process-wide singletons, built once at startup and shared by handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub queue: Arc<DownloadQueue>,
    pub hub: EventHub,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Spawn the event hub and the worker pool, wired through a
    /// [`ProgressBridge`].
    pub fn start(config: Config) -> Result<Self, QueueError> {
        let metrics = Arc::new(Metrics::new());
        let (hub, _hub_task) = EventHub::spawn(config.events.client_buffer, metrics.clone());
        let bridge = ProgressBridge::new(hub.clone(), metrics.clone());

        let queue = DownloadQueue::start(&config.queue, config.downloader.clone(), Arc::new(bridge))?;

        Ok(Self {
            config: Arc::new(config),
            queue: Arc::new(queue),
            hub,
            metrics,
        })
    }

    /// Stop accepting work, cancel in-flight downloads and end all event
    /// streams.
    pub async fn shutdown(&self) {
        self.hub.close();
        self.queue.shutdown().await;
    }
}
