//! Connected frontends and their voice sessions.

use crate::channel::BoxFuture;
use crate::events::{Notifier, OutboundEvent};
use crate::session::ClientSession;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

/// Outgoing text frames for one frontend socket.
pub type FrontendSender = mpsc::Sender<String>;

/// Owns the connection map and the session map. Each map operation is
/// atomic per key; locks are never held across an await.
#[derive(Default)]
pub struct ClientRegistry {
    connections: RwLock<HashMap<String, FrontendSender>>,
    sessions: RwLock<HashMap<String, Arc<ClientSession>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a frontend channel, replacing any older one for the same id.
    pub fn connect(&self, client_id: &str, channel: FrontendSender) {
        let replaced = write(&self.connections).insert(client_id.to_string(), channel);
        if replaced.is_some() {
            tracing::info!(client_id, "Client reconnected, replacing previous channel");
        } else {
            tracing::info!(client_id, "Client connected");
        }
    }

    /// Drop the client's channel and tear down its session. Idempotent.
    pub async fn disconnect(&self, client_id: &str) {
        let had_connection = write(&self.connections).remove(client_id).is_some();
        self.release_session(client_id).await;
        if had_connection {
            tracing::info!(client_id, "Client disconnected");
        }
    }

    /// Disconnect only while `channel` is still the one registered for the
    /// client. A socket superseded by a reconnect leaves the newer one alone.
    pub async fn disconnect_channel(&self, client_id: &str, channel: &FrontendSender) -> bool {
        let removed = {
            let mut connections = write(&self.connections);
            match connections.get(client_id) {
                Some(current) if current.same_channel(channel) => connections.remove(client_id).is_some(),
                _ => false,
            }
        };
        if !removed {
            tracing::debug!(client_id, "Superseded connection closed, keeping the newer one");
            return false;
        }
        self.release_session(client_id).await;
        tracing::info!(client_id, "Client disconnected");
        true
    }

    async fn release_session(&self, client_id: &str) {
        if let Some(session) = self.remove_session(client_id) {
            session.release().await;
            tracing::info!(client_id, "Voice session released on disconnect");
        }
    }

    /// Best-effort delivery. A failed send disconnects the client.
    pub async fn send(&self, client_id: &str, event: &OutboundEvent) {
        let Some(channel) = read(&self.connections).get(client_id).cloned() else {
            tracing::trace!(client_id, event_type = event.event_type(), "No channel for client, dropping event");
            return;
        };
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(client_id, error = %err, "Failed to serialize outbound event");
                return;
            }
        };
        if channel.send(text).await.is_err() {
            tracing::warn!(client_id, "Frontend channel closed, disconnecting client");
            self.disconnect(client_id).await;
        }
    }

    /// Deliver to every connected client in turn; failures only affect the failing client.
    pub async fn broadcast(&self, event: &OutboundEvent) {
        for client_id in self.client_ids() {
            self.send(&client_id, event).await;
        }
    }

    #[must_use]
    pub fn client_ids(&self) -> Vec<String> {
        read(&self.connections).keys().cloned().collect()
    }

    #[must_use]
    pub fn is_connected(&self, client_id: &str) -> bool {
        read(&self.connections).contains_key(client_id)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        read(&self.connections).len()
    }

    /// Store a session, returning the one it replaced.
    pub fn insert_session(&self, session: Arc<ClientSession>) -> Option<Arc<ClientSession>> {
        write(&self.sessions).insert(session.client_id.clone(), session)
    }

    #[must_use]
    pub fn session(&self, client_id: &str) -> Option<Arc<ClientSession>> {
        read(&self.sessions).get(client_id).cloned()
    }

    pub fn remove_session(&self, client_id: &str) -> Option<Arc<ClientSession>> {
        write(&self.sessions).remove(client_id)
    }

    #[must_use]
    pub fn session_ids(&self) -> Vec<String> {
        read(&self.sessions).keys().cloned().collect()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        read(&self.sessions).len()
    }
}

/// Routes notifications to one client through the registry.
pub struct ClientNotifier {
    registry: Arc<ClientRegistry>,
    client_id: String,
}

impl ClientNotifier {
    #[must_use]
    pub fn new(registry: Arc<ClientRegistry>, client_id: &str) -> Self {
        Self { registry, client_id: client_id.to_string() }
    }
}

impl Notifier for ClientNotifier {
    fn notify(&self, event: OutboundEvent) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.registry.send(&self.client_id, &event).await })
    }
}
