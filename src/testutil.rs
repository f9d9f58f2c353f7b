//! Shared test helpers for unit tests that need a full application state.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{issue_session, SESSION_TTL};
use crate::config::{Config, NodeConfig, SessionConfig, StorageConfig, SyncConfig};
use crate::content_store::LocalStore;
use crate::storage::Database;
use crate::AppState;

/// Create a test AppState with a temporary database and content store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    test_state_with(temp_dir, |_| {})
}

/// Like [`test_state`], with the config adjusted before the state is built.
pub fn test_state_with(
    temp_dir: &tempfile::TempDir,
    configure: impl FnOnce(&mut Config),
) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let upload_dir = temp_dir.path().join("uploads");

    let mut config = Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        storage: StorageConfig {
            upload_dir: upload_dir.to_string_lossy().to_string(),
        },
        session: SessionConfig::default(),
        sync: SyncConfig::default(),
        bulk_operation_timeout: Duration::from_secs(30),
        test_mode: true,
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
    };

    configure(&mut config);

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let store = LocalStore::new(&upload_dir).expect("Failed to create test content store");

    Arc::new(AppState::new(config, db, Arc::new(store)))
}

/// Issue a session and return its bearer header value.
pub fn bearer_for(state: &AppState, user_id: &str) -> String {
    let session = issue_session(&state.db, user_id, SESSION_TTL).expect("Failed to issue session");
    format!("Bearer {}", session.token)
}
