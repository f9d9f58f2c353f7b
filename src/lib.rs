//! cloud-drive - A personal cloud drive service
//!
//! This crate provides hierarchical file storage for many accounts with:
//! - Folders with materialized paths, move/copy/recursive delete
//! - Content-hashed blobs in a filesystem store namespaced per account
//! - A per-file version ledger with restore
//! - Public share links and direct user-to-user grants
//! - Real-time sync events over WebSocket plus a catch-up query
//! - redb embedded database for metadata (ACID, MVCC, crash-safe)

pub mod api;
pub mod auth;
pub mod config;
pub mod content_store;
pub mod drive;
pub mod secrets;
pub mod storage;
pub mod sync;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use content_store::ContentStore;
use drive::Drive;
use storage::Database;
use sync::SyncHub;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub drive: Arc<Drive>,
    pub sync: Arc<SyncHub>,
}

impl AppState {
    /// Wire the services together over an opened database and content store.
    pub fn new(config: Config, db: Database, content_store: Arc<dyn ContentStore>) -> Self {
        let sync = Arc::new(SyncHub::new(db.clone(), &config.sync));
        let drive = Arc::new(Drive::new(
            db.clone(),
            content_store,
            Arc::clone(&sync),
            config.bulk_operation_timeout,
        ));
        Self {
            config,
            db,
            drive,
            sync,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::auth::authenticate;
    use crate::testutil::{bearer_for, test_state};

    #[tokio::test]
    async fn test_state_wires_services() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let header = bearer_for(&state, "alice");
        let token = header.trim_start_matches("Bearer ");
        let session = authenticate(&state.db, token, state.config.session.inactivity_timeout).unwrap();
        assert_eq!(session.user_id, "alice");

        let folder = state.drive.create_folder("alice", "Docs", None, None).await.unwrap();
        assert_eq!(folder.path, "/Docs");
        let catch_up = state.sync.catch_up("alice", None).unwrap();
        assert_eq!(catch_up.folders.len(), 1);
    }
}
