//! Live-reload channel: pushes build notifications to connected browsers.
//!
//! Each WebSocket client owns a bounded queue. Broadcasting never waits on a
//! client; one whose queue is full or closed is dropped and the others are
//! unaffected.

use crate::error::ServeError;
use crate::serve::build_watcher::{BuildEvent, BuildOutcome};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// WebSocket endpoint path.
pub const SOCKET_PATH: &str = "/__rove__/livereload";
/// Browser client script path.
pub const SCRIPT_PATH: &str = "/__rove__/livereload.js";

const CLIENT_SCRIPT: &str = include_str!("../../assets/serve/livereload-client.js");

/// Frames queued per client before it counts as too slow.
const CLIENT_QUEUE: usize = 32;

/// Notification sent to browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReloadMessage {
    FullReload { generation: u64 },
    ModuleUpdate { generation: u64, modules: Vec<String> },
    BuildError { generation: u64, error: String },
    Shutdown { reason: String },
}

impl ReloadMessage {
    /// Pick the notification for a build event.
    pub fn for_event(event: &BuildEvent, hmr_enabled: bool) -> Self {
        match &event.outcome {
            BuildOutcome::Succeeded {
                changes,
                hmr_eligible: true,
                ..
            } if hmr_enabled => ReloadMessage::ModuleUpdate {
                generation: event.generation,
                modules: changes
                    .updated()
                    .filter(|path| !path.ends_with(".map"))
                    .map(str::to_string)
                    .collect(),
            },
            BuildOutcome::Succeeded { .. } => ReloadMessage::FullReload {
                generation: event.generation,
            },
            BuildOutcome::Failed { error } => ReloadMessage::BuildError {
                generation: event.generation,
                error: error.clone(),
            },
        }
    }
}

/// Messages browsers send back.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Ack { generation: u64 },
}

/// One registered browser connection.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    pub id: u64,
    last_ack: Arc<AtomicU64>,
}

impl ClientConnection {
    /// Last generation the client reported as applied.
    pub fn last_acknowledged(&self) -> u64 {
        self.last_ack.load(Ordering::Acquire)
    }

    fn acknowledge(&self, generation: u64) {
        self.last_ack.fetch_max(generation, Ordering::AcqRel);
    }
}

struct ClientSlot {
    tx: mpsc::Sender<Arc<str>>,
    connection: ClientConnection,
}

/// Channel settings.
#[derive(Debug, Clone)]
pub struct ReloadSettings {
    pub enabled: bool,
    pub hmr: bool,
    pub send_timeout: Duration,
    /// URL the browser client connects to instead of the same-origin socket
    pub client_url: Option<String>,
}

pub struct ReloadChannel {
    settings: ReloadSettings,
    clients: RwLock<HashMap<u64, ClientSlot>>,
    next_id: AtomicU64,
}

impl ReloadChannel {
    pub fn new(settings: ReloadSettings) -> Self {
        Self {
            settings,
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn hmr_enabled(&self) -> bool {
        self.settings.hmr
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Connections currently registered, in no particular order.
    pub fn connections(&self) -> Vec<ClientConnection> {
        self.clients
            .read()
            .values()
            .map(|slot| slot.connection.clone())
            .collect()
    }

    pub fn register(&self) -> (ClientConnection, mpsc::Receiver<Arc<str>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
        let connection = ClientConnection {
            id,
            last_ack: Arc::new(AtomicU64::new(0)),
        };

        self.clients.write().insert(
            id,
            ClientSlot {
                tx,
                connection: connection.clone(),
            },
        );
        tracing::debug!(client = id, "Live-reload client connected");

        (connection, rx)
    }

    pub fn unregister(&self, id: u64) {
        if self.clients.write().remove(&id).is_some() {
            tracing::debug!(client = id, "Live-reload client disconnected");
        }
    }

    /// Queue `message` for every client. Returns how many accepted it.
    pub fn broadcast(&self, message: &ReloadMessage) -> usize {
        if !self.settings.enabled {
            return 0;
        }

        let frame: Arc<str> = match serde_json::to_string(message) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize reload message");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dropped = Vec::new();
        {
            let clients = self.clients.read();
            for (id, slot) in clients.iter() {
                match slot.tx.try_send(Arc::clone(&frame)) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        let reason = match e {
                            mpsc::error::TrySendError::Full(_) => "queue full",
                            mpsc::error::TrySendError::Closed(_) => "connection closed",
                        };
                        dropped.push(ServeError::ClientChannel {
                            client: *id,
                            reason: reason.to_string(),
                        });
                    }
                }
            }
        }

        if !dropped.is_empty() {
            let mut clients = self.clients.write();
            for err in dropped {
                if let ServeError::ClientChannel { client, .. } = &err {
                    clients.remove(client);
                }
                tracing::warn!("{}", err);
            }
        }

        delivered
    }

    /// Notify every client of `event`.
    pub fn notify(&self, event: &BuildEvent) -> usize {
        self.broadcast(&ReloadMessage::for_event(event, self.settings.hmr))
    }

    /// Send a shutdown notice and disconnect everyone.
    ///
    /// Dropping the queue senders ends each writer, which then sends a close
    /// frame after draining the notice.
    pub fn close_all(&self, reason: &str) {
        self.broadcast(&ReloadMessage::Shutdown {
            reason: reason.to_string(),
        });
        let count = {
            let mut clients = self.clients.write();
            let count = clients.len();
            clients.clear();
            count
        };
        tracing::debug!(clients = count, "Closed live-reload clients");
    }

    /// Browser client script, prefixed with its runtime settings.
    pub fn client_script(&self) -> String {
        let url = serde_json::to_string(&self.settings.client_url).unwrap_or_else(|_| "null".to_string());
        format!(
            "window.__ROVE_LIVERELOAD__ = {{ url: {}, path: {:?}, hmr: {} }};\n{}",
            url, SOCKET_PATH, self.settings.hmr, CLIENT_SCRIPT
        )
    }

    /// Drive one accepted WebSocket until either side goes away.
    pub async fn serve_socket(self: Arc<Self>, socket: WebSocket) {
        let (connection, mut rx) = self.register();
        let (mut sink, mut stream) = socket.split();
        let send_timeout = self.settings.send_timeout;
        let id = connection.id;

        let writer = async {
            while let Some(frame) = rx.recv().await {
                let send = sink.send(Message::Text(frame.as_ref().into()));
                match tokio::time::timeout(send_timeout, send).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(client = id, error = %e, "Live-reload send failed");
                        return;
                    }
                    Err(_) => {
                        tracing::warn!(
                            "{}",
                            ServeError::ClientChannel {
                                client: id,
                                reason: format!("send timed out after {:?}", send_timeout),
                            }
                        );
                        return;
                    }
                }
            }
            let _ = tokio::time::timeout(send_timeout, sink.send(Message::Close(None))).await;
        };

        let reader = async {
            while let Some(Ok(message)) = stream.next().await {
                match message {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(ClientMessage::Ack { generation }) => {
                            connection.acknowledge(generation);
                            tracing::trace!(client = id, generation, "Client acknowledged");
                        }
                        Err(e) => tracing::debug!(client = id, error = %e, "Ignoring client message"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        };

        tokio::select! {
            _ = writer => {}
            _ = reader => {}
        }

        self.unregister(id);
    }
}
