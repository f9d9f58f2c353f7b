use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::models::{FileRecord, FolderRecord, SyncEventRecord};

/// Frames pushed to connected clients, encoded as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "file:uploaded")]
    FileUploaded(FileRecord),
    #[serde(rename = "file:updated")]
    FileUpdated(FileRecord),
    #[serde(rename = "file:deleted")]
    FileDeleted(Removed),
    #[serde(rename = "folder:created")]
    FolderCreated(FolderRecord),
    #[serde(rename = "folder:updated")]
    FolderUpdated(FolderRecord),
    #[serde(rename = "folder:deleted")]
    FolderDeleted(Removed),
    /// A client-reported event relayed to the account's other devices.
    #[serde(rename = "sync:event")]
    SyncEvent(SyncEventRecord),
    #[serde(rename = "sync:response")]
    SyncResponse(CatchUp),
    #[serde(rename = "sync:error")]
    SyncError(SyncFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Removed {
    pub id: String,
}

/// Everything changed after a client's last sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchUp {
    pub files: Vec<FileRecord>,
    pub folders: Vec<FolderRecord>,
    /// Value to send as `lastSync` on the next request.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub message: String,
}

/// Frames accepted from connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "sync:request")]
    SyncRequest(SyncRequest),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

impl ServerMessage {
    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::FileUploaded(_) => "file:uploaded",
            ServerMessage::FileUpdated(_) => "file:updated",
            ServerMessage::FileDeleted(_) => "file:deleted",
            ServerMessage::FolderCreated(_) => "folder:created",
            ServerMessage::FolderUpdated(_) => "folder:updated",
            ServerMessage::FolderDeleted(_) => "folder:deleted",
            ServerMessage::SyncEvent(_) => "sync:event",
            ServerMessage::SyncResponse(_) => "sync:response",
            ServerMessage::SyncError(_) => "sync:error",
        }
    }

    /// Build the durable log entry for a hierarchy mutation. Replies and
    /// relayed client events are not logged here.
    pub(crate) fn to_log_record(&self, owner_id: &str) -> Option<SyncEventRecord> {
        let (file_id, folder_id) = match self {
            ServerMessage::FileUploaded(f) | ServerMessage::FileUpdated(f) => {
                (Some(f.id.clone()), f.folder_id.clone())
            }
            ServerMessage::FileDeleted(r) => (Some(r.id.clone()), None),
            ServerMessage::FolderCreated(f) | ServerMessage::FolderUpdated(f) => {
                (None, Some(f.id.clone()))
            }
            ServerMessage::FolderDeleted(r) => (None, Some(r.id.clone())),
            ServerMessage::SyncEvent(_)
            | ServerMessage::SyncResponse(_)
            | ServerMessage::SyncError(_) => return None,
        };

        let metadata = serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("data").map(serde_json::Value::take));

        Some(SyncEventRecord {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: self.kind().to_string(),
            file_id,
            folder_id,
            owner_id: owner_id.to_string(),
            metadata,
            created_at: Utc::now(),
        })
    }
}
