use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::messages::ServerMessage;

pub type ConnectionId = Uuid;

/// One live real-time connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub owner_id: String,
    pub session_token: String,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    /// Queue a message without waiting. Returns false when the buffer is full
    /// or the connection is gone; the message is dropped either way.
    pub fn try_send(&self, msg: ServerMessage) -> bool {
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                tracing::warn!(
                    connection_id = %self.id,
                    owner_id = %self.owner_id,
                    event = msg.kind(),
                    "Outbound buffer full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Live connections grouped by account.
#[derive(Debug)]
pub struct ConnectionRegistry {
    by_owner: DashMap<String, Vec<Arc<ConnectionHandle>>>,
    capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            by_owner: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a connection and hand back the receiving end of its buffer.
    pub fn register(
        &self,
        owner_id: &str,
        session_token: &str,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<ServerMessage>) {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let handle = Arc::new(ConnectionHandle {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            session_token: session_token.to_string(),
            connected_at: Utc::now(),
            sender,
        });
        self.by_owner
            .entry(owner_id.to_string())
            .or_default()
            .push(Arc::clone(&handle));
        (handle, receiver)
    }

    pub fn unregister(&self, owner_id: &str, id: &ConnectionId) {
        if let Some(mut connections) = self.by_owner.get_mut(owner_id) {
            connections.retain(|c| c.id != *id);
            if connections.is_empty() {
                drop(connections);
                self.by_owner.remove_if(owner_id, |_, v| v.is_empty());
            }
        }
    }

    /// Deliver to every connection of the account, at most once each.
    /// Returns how many connections accepted the message.
    pub fn broadcast(&self, owner_id: &str, msg: &ServerMessage) -> usize {
        let connections = self
            .by_owner
            .get(owner_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let mut delivered = 0;
        for conn in &connections {
            if conn.is_closed() {
                self.unregister(owner_id, &conn.id);
                continue;
            }
            if conn.try_send(msg.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn connection_count(&self, owner_id: &str) -> usize {
        self.by_owner.get(owner_id).map(|c| c.len()).unwrap_or(0)
    }
}
