//! Sync broadcaster: durable per-account event log plus best-effort push to
//! live connections.
//!
//! Push delivery is at-most-once. The catch-up query is the authoritative
//! path; a client that missed pushes recovers by asking for everything that
//! changed after its last sync.

pub mod messages;
pub mod registry;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::SyncConfig;
use crate::storage::models::{FileRecord, FolderRecord, SyncEventRecord};
use crate::storage::{files, folders, Database, DatabaseError};

pub use messages::{CatchUp, ClientMessage, Removed, ServerMessage, SyncFailure, SyncRequest};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};

/// An event reported by a client for relay to the account's other devices.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub file_id: Option<String>,
    pub folder_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

pub struct SyncHub {
    db: Database,
    registry: ConnectionRegistry,
    page_size: usize,
}

impl SyncHub {
    pub fn new(db: Database, config: &SyncConfig) -> Self {
        Self {
            db,
            registry: ConnectionRegistry::new(config.channel_capacity),
            page_size: config.page_size.max(1),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Log a committed mutation and push it to the owner's connections.
    ///
    /// The mutation has already been committed, so a failure to append to the
    /// log is reported but not returned.
    pub fn publish(&self, owner_id: &str, msg: ServerMessage) {
        if let Some(record) = msg.to_log_record(owner_id) {
            if let Err(e) = self.db.append_sync_event(&record) {
                tracing::warn!(owner_id, event = msg.kind(), "Failed to log sync event: {}", e);
            }
        }

        let delivered = self.registry.broadcast(owner_id, &msg);
        tracing::debug!(owner_id, event = msg.kind(), delivered, "Published sync event");
    }

    /// Store a client-reported event and relay it as `sync:event`.
    pub fn record_client_event(
        &self,
        owner_id: &str,
        event: ClientEvent,
    ) -> Result<SyncEventRecord, DatabaseError> {
        let record = SyncEventRecord {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event.event_type,
            file_id: event.file_id,
            folder_id: event.folder_id,
            owner_id: owner_id.to_string(),
            metadata: event.metadata,
            created_at: Utc::now(),
        };
        self.db.append_sync_event(&record)?;
        self.registry
            .broadcast(owner_id, &ServerMessage::SyncEvent(record.clone()));
        Ok(record)
    }

    /// Logged events after `since`, oldest first, capped at the page size.
    pub fn events_since(
        &self,
        owner_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SyncEventRecord>, DatabaseError> {
        self.db.sync_events_since(owner_id, since, self.page_size)
    }

    /// Files and folders updated strictly after `since` (everything when
    /// `None`), oldest change first, capped at the page size.
    ///
    /// When the cap cuts the result short, the returned timestamp is that of
    /// the newest item included, so polling again picks up where this left
    /// off. Items sharing that timestamp are never split across pages, so a
    /// page may run past the cap.
    pub fn catch_up(
        &self,
        owner_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<CatchUp, DatabaseError> {
        let now = Utc::now();
        let read_txn = self.db.begin_read()?;

        let changed = |ts: DateTime<Utc>| since.map_or(true, |since| ts > since);

        let mut items: Vec<(DateTime<Utc>, Changed)> = Vec::new();
        for file in files::all_for_owner(&read_txn, owner_id)? {
            if changed(file.updated_at) {
                items.push((file.updated_at, Changed::File(file)));
            }
        }
        for folder in folders::all_for_owner(&read_txn, owner_id)? {
            if changed(folder.updated_at) {
                items.push((folder.updated_at, Changed::Folder(folder)));
            }
        }
        items.sort_by_key(|(ts, _)| *ts);

        let mut timestamp = now;
        if items.len() > self.page_size {
            let cut = items[self.page_size - 1].0;
            let end = items
                .iter()
                .position(|(ts, _)| *ts > cut)
                .unwrap_or(items.len());
            items.truncate(end);
            timestamp = cut;
        }

        let mut catch_up = CatchUp {
            files: Vec::new(),
            folders: Vec::new(),
            timestamp,
        };
        for (_, item) in items {
            match item {
                Changed::File(f) => catch_up.files.push(f),
                Changed::Folder(f) => catch_up.folders.push(f),
            }
        }
        Ok(catch_up)
    }
}

enum Changed {
    File(FileRecord),
    Folder(FolderRecord),
}
