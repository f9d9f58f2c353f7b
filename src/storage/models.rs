use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default color assigned to folders created without one
pub const DEFAULT_FOLDER_COLOR: &str = "yellow-400";

/// A folder node. `path` is the slash-joined chain of ancestor names,
/// always starting with `/` (e.g. `/Archive/Reports`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    pub id: String,
    pub name: String,
    pub path: String,
    pub parent_id: Option<String>,
    pub owner_id: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A file placed in a folder (or at the root when `folder_id` is `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    /// Content store key of the live bytes
    pub stored_name: String,
    pub display_name: String,
    pub folder_id: Option<String>,
    pub owner_id: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of a file taken right before it is overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    pub id: String,
    pub file_id: String,
    pub version_number: u32,
    pub display_name: String,
    pub stored_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Public link to a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecord {
    pub id: String,
    pub file_id: String,
    pub token: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_downloads: Option<u32>,
    pub download_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Direct grant of one file to another account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserShareRecord {
    pub id: String,
    pub file_id: String,
    pub shared_with_user_id: String,
    pub shared_by_user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Entry of the durable sync log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEventRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Pre-issued session used as the caller identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}
