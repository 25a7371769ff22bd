//! Single-owner broadcast hub.
//!
//! One task owns the client set and handles add, remove and broadcast
//! commands in arrival order. Commands travel over an unbounded channel so
//! `broadcast` can be called from synchronous progress callbacks and never
//! waits on a subscriber. Each subscriber gets a bounded sink; a sink that
//! is full at broadcast time is evicted and closed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::observability::Metrics;

pub type ClientId = u64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("event hub is closed")]
    Closed,
}

/// A registered subscriber: its id (for removal) and its message sink.
#[derive(Debug)]
pub struct Subscription {
    pub id: ClientId,
    pub receiver: mpsc::Receiver<Arc<str>>,
}

enum Command {
    Add(oneshot::Sender<Subscription>),
    Remove(ClientId),
    Broadcast(Arc<str>),
    Count(oneshot::Sender<usize>),
    Close,
}

#[derive(Clone)]
pub struct EventHub {
    commands: mpsc::UnboundedSender<Command>,
}

impl EventHub {
    /// Start the owning task. `client_buffer` is the per-subscriber sink
    /// capacity.
    pub fn spawn(client_buffer: usize, metrics: Arc<Metrics>) -> (Self, JoinHandle<()>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let owner = HubOwner {
            clients: HashMap::new(),
            next_id: 0,
            client_buffer: client_buffer.max(1),
            metrics,
        };
        let handle = tokio::spawn(owner.run(receiver));

        (Self { commands }, handle)
    }

    pub async fn add_client(&self) -> Result<Subscription, HubError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Add(reply))
            .map_err(|_| HubError::Closed)?;
        response.await.map_err(|_| HubError::Closed)
    }

    /// Unregister a client. Unknown or already removed ids are ignored.
    pub fn remove_client(&self, id: ClientId) {
        let _ = self.commands.send(Command::Remove(id));
    }

    /// Queue `message` for every subscriber. Never waits.
    pub fn broadcast(&self, message: impl Into<Arc<str>>) {
        let _ = self.commands.send(Command::Broadcast(message.into()));
    }

    pub fn broadcast_json<T: Serialize>(&self, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => self.broadcast(json),
            Err(e) => warn!(error = %e, "Failed to serialize broadcast payload"),
        }
    }

    pub async fn client_count(&self) -> usize {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Count(reply)).is_err() {
            return 0;
        }
        response.await.unwrap_or(0)
    }

    /// Drop every subscriber and stop the owning task. Open streams end
    /// after their buffered messages.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

struct HubOwner {
    clients: HashMap<ClientId, mpsc::Sender<Arc<str>>>,
    next_id: ClientId,
    client_buffer: usize,
    metrics: Arc<Metrics>,
}

impl HubOwner {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(client_buffer = self.client_buffer, "Event hub started");

        while let Some(command) = commands.recv().await {
            match command {
                Command::Add(reply) => self.add(reply),
                Command::Remove(id) => self.remove(id),
                Command::Broadcast(message) => self.broadcast(message),
                Command::Count(reply) => {
                    let _ = reply.send(self.clients.len());
                }
                Command::Close => break,
            }
        }

        let remaining = self.clients.len();
        self.clients.clear();
        info!(remaining, "Event hub stopped");
    }

    fn add(&mut self, reply: oneshot::Sender<Subscription>) {
        let id = self.next_id;
        self.next_id += 1;

        let (sink, receiver) = mpsc::channel(self.client_buffer);
        if reply.send(Subscription { id, receiver }).is_ok() {
            self.clients.insert(id, sink);
            debug!(client_id = id, clients = self.clients.len(), "Subscriber added");
        }
    }

    fn remove(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            debug!(client_id = id, clients = self.clients.len(), "Subscriber removed");
        }
    }

    fn broadcast(&mut self, message: Arc<str>) {
        self.metrics.event_broadcast();
        let metrics = &self.metrics;

        self.clients.retain(|&id, sink| match sink.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(client_id = id, "Evicting unresponsive subscriber");
                metrics.client_evicted();
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(client_id = id, "Subscriber went away");
                false
            }
        });
    }
}
