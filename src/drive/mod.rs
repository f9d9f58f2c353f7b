//! The drive service: folder hierarchy, file placement, version ledger and
//! sharing for every account.
//!
//! Every operation takes the caller's account id and checks ownership itself;
//! records owned by someone else are reported as [`DriveError::NotFound`].
//! Structural mutations hold the account's lock for their whole duration.

mod error;
mod files;
mod folders;
mod locks;
mod shares;
mod tree;
mod versions;

pub use error::DriveError;
pub use files::{Download, Upload, UploadOutcome};
pub use folders::{Breadcrumb, DeleteSummary, FolderCounts, FolderListing, FolderPatch, FolderSummary};
pub use locks::{AccountGuard, AccountLocks};
pub use shares::{NewShare, ShareView, SharedFile};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::content_store::ContentStore;
use crate::storage::models::{FileRecord, FolderRecord};
use crate::storage::{self, Database, Reader};
use crate::sync::SyncHub;

pub struct Drive {
    db: Database,
    store: Arc<dyn ContentStore>,
    sync: Arc<SyncHub>,
    locks: AccountLocks,
    bulk_timeout: Duration,
}

impl Drive {
    pub fn new(
        db: Database,
        store: Arc<dyn ContentStore>,
        sync: Arc<SyncHub>,
        bulk_timeout: Duration,
    ) -> Self {
        Self {
            db,
            store,
            sync,
            locks: AccountLocks::new(),
            bulk_timeout,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn content_store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    async fn lock(&self, owner_id: &str) -> AccountGuard<'_> {
        self.locks.lock(owner_id).await
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.bulk_timeout
    }

    /// Delete blobs that no committed record references anymore. Failures
    /// are logged and otherwise ignored.
    async fn release_blobs(&self, stored_ids: &[String]) {
        for stored_id in stored_ids {
            if let Err(e) = self.store.delete(stored_id).await {
                tracing::warn!(stored_id = %stored_id, "Failed to delete blob: {}", e);
            }
        }
    }
}

// ============================================================================
// Ownership and naming
// ============================================================================

pub(crate) fn owned_folder<R: Reader>(
    reader: &R,
    owner_id: &str,
    id: &str,
) -> Result<FolderRecord, DriveError> {
    storage::folders::get(reader, id)?
        .filter(|f| f.owner_id == owner_id)
        .ok_or(DriveError::NotFound)
}

pub(crate) fn owned_file<R: Reader>(
    reader: &R,
    owner_id: &str,
    id: &str,
) -> Result<FileRecord, DriveError> {
    storage::files::get(reader, id)?
        .filter(|f| f.owner_id == owner_id)
        .ok_or(DriveError::NotFound)
}

/// Resolve an optional destination folder; `None` is the account root.
pub(crate) fn destination<R: Reader>(
    reader: &R,
    owner_id: &str,
    folder_id: Option<&str>,
) -> Result<Option<FolderRecord>, DriveError> {
    folder_id
        .map(|id| owned_folder(reader, owner_id, id))
        .transpose()
}

/// Trim a file or folder name and reject ones that cannot live in a path.
pub(crate) fn clean_name(name: &str) -> Result<String, DriveError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DriveError::Validation("name is required".to_string()));
    }
    if name == "." || name == ".." {
        return Err(DriveError::Validation(format!("'{name}' is not a valid name")));
    }
    if name.contains('/') || name.chars().any(char::is_control) {
        return Err(DriveError::Validation(
            "name must not contain '/' or control characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("  Reports ").unwrap(), "Reports");
        assert!(matches!(clean_name("   "), Err(DriveError::Validation(_))));
        assert!(matches!(clean_name("a/b"), Err(DriveError::Validation(_))));
        assert!(matches!(clean_name(".."), Err(DriveError::Validation(_))));
        assert!(matches!(clean_name("a\u{1f}b"), Err(DriveError::Validation(_))));
    }

    #[tokio::test]
    async fn test_account_lock_released_after_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let state = crate::testutil::test_state(&dir);

        let docs = state
            .drive
            .create_folder("alice", "Docs", None, None)
            .await
            .unwrap();
        state.drive.delete_folder("alice", &docs.id, false).await.unwrap();

        assert_eq!(state.drive.locks.len(), 0);
    }
}
