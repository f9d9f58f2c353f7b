use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use uuid::Uuid;

use super::{owned_file, Drive, DriveError};
use crate::content_store::{ContentStoreError, StoredBlob};
use crate::storage::models::{FileRecord, FileVersion};
use crate::storage::{self, DatabaseError};
use crate::sync::ServerMessage;

/// Record the current state of `file` as its next version.
pub(crate) fn snapshot(
    txn: &WriteTransaction,
    file: &FileRecord,
    now: DateTime<Utc>,
) -> Result<FileVersion, DatabaseError> {
    let version = FileVersion {
        id: Uuid::new_v4().to_string(),
        file_id: file.id.clone(),
        version_number: storage::versions::latest_number(txn, &file.id)? + 1,
        display_name: file.display_name.clone(),
        stored_name: file.stored_name.clone(),
        size_bytes: file.size_bytes,
        mime_type: file.mime_type.clone(),
        content_hash: file.content_hash.clone(),
        created_at: now,
    };
    storage::versions::append(txn, &version)?;
    Ok(version)
}

impl Drive {
    /// Versions of a file, newest first.
    pub fn list_versions(&self, owner_id: &str, file_id: &str) -> Result<Vec<FileVersion>, DriveError> {
        let read_txn = self.db.begin_read()?;
        owned_file(&read_txn, owner_id, file_id)?;
        let mut versions = storage::versions::list(&read_txn, file_id)?;
        versions.reverse();
        Ok(versions)
    }

    /// Bring a file back to a recorded version.
    ///
    /// The current state is versioned first, so a restore can itself be
    /// undone. The version's bytes are copied to a fresh blob; the version
    /// keeps its own.
    pub async fn restore_version(
        &self,
        owner_id: &str,
        file_id: &str,
        version_id: &str,
    ) -> Result<FileRecord, DriveError> {
        let _guard = self.lock(owner_id).await;

        let version = {
            let read_txn = self.db.begin_read()?;
            owned_file(&read_txn, owner_id, file_id)?;
            storage::versions::get(&read_txn, version_id)?
                .filter(|v| v.file_id == file_id)
                .ok_or(DriveError::NotFound)?
        };

        let blob = match self.store.copy(&version.stored_name, owner_id).await {
            Ok(blob) => blob,
            Err(ContentStoreError::NotFound(_)) => {
                tracing::error!(
                    file_id,
                    version_id,
                    stored_name = %version.stored_name,
                    "Blob missing for file version"
                );
                return Err(DriveError::BlobMissing(version.id));
            }
            Err(e) => return Err(e.into()),
        };

        let file = match self.commit_restore(owner_id, file_id, &version, &blob) {
            Ok(file) => file,
            Err(e) => {
                self.release_blobs(&[blob.stored_id]).await;
                return Err(e);
            }
        };

        tracing::info!(
            file_id,
            version = version.version_number,
            "Restored file version"
        );
        self.sync
            .publish(owner_id, ServerMessage::FileUpdated(file.clone()));
        Ok(file)
    }

    fn commit_restore(
        &self,
        owner_id: &str,
        file_id: &str,
        version: &FileVersion,
        blob: &StoredBlob,
    ) -> Result<FileRecord, DriveError> {
        let write_txn = self.db.begin_write()?;
        let old = owned_file(&write_txn, owner_id, file_id)?;

        let now = Utc::now();
        snapshot(&write_txn, &old, now)?;

        let mut file = old.clone();
        file.stored_name = blob.stored_id.clone();
        file.display_name = version.display_name.clone();
        file.size_bytes = blob.size;
        file.mime_type = version.mime_type.clone();
        file.content_hash = blob.hash.clone();
        file.updated_at = now;
        storage::files::update(&write_txn, &old, &file)?;
        write_txn.commit()?;
        Ok(file)
    }
}
