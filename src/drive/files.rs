use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::folders::filter_files;
use super::versions::snapshot;
use super::{clean_name, destination, owned_file, Drive, DriveError};
use crate::content_store::{BlobReader, ByteStream, ContentStoreError, StoredBlob};
use crate::storage::models::FileRecord;
use crate::storage::{self, Reader};
use crate::sync::{Removed, ServerMessage};

// ============================================================================
// Types
// ============================================================================

/// An incoming file body with its metadata.
pub struct Upload<'a> {
    pub folder_id: Option<String>,
    pub file_name: String,
    /// Content type reported by the client, if any.
    pub mime_type: Option<String>,
    pub body: ByteStream<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub file: FileRecord,
    /// The content matched an existing file with the same name, which was
    /// versioned instead of creating a new file.
    pub versioned: bool,
}

/// A file ready to be streamed to a client.
pub struct Download {
    pub file: FileRecord,
    pub reader: BlobReader,
    pub size: u64,
}

fn guess_mime(name: &str, reported: Option<String>) -> String {
    reported
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty() && m != "application/octet-stream")
        .unwrap_or_else(|| {
            mime_guess::from_path(name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        })
}

/// Whether `user_id` may read `file`: its owner or a grantee.
fn can_read<R: Reader>(reader: &R, file: &FileRecord, user_id: &str) -> Result<bool, DriveError> {
    if file.owner_id == user_id {
        return Ok(true);
    }
    Ok(storage::user_shares::for_pair(reader, &file.id, user_id)?.is_some())
}

impl Drive {
    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_file(&self, owner_id: &str, id: &str) -> Result<FileRecord, DriveError> {
        let read_txn = self.db.begin_read()?;
        owned_file(&read_txn, owner_id, id)
    }

    /// Files directly in a folder, newest first, optionally filtered by name.
    pub fn list_files(
        &self,
        owner_id: &str,
        folder_id: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<FileRecord>, DriveError> {
        let read_txn = self.db.begin_read()?;
        destination(&read_txn, owner_id, folder_id)?;
        let files = storage::files::in_folder(&read_txn, owner_id, folder_id)?;
        Ok(filter_files(files, search))
    }

    /// Open a file for streaming. Grantees may read files they do not own.
    pub async fn open_file(&self, user_id: &str, id: &str) -> Result<Download, DriveError> {
        let file = self.readable_file(user_id, id)?;
        self.open_blob(file).await
    }

    /// Metadata of a readable file, after checking its bytes still exist.
    pub async fn stat_file(&self, user_id: &str, id: &str) -> Result<FileRecord, DriveError> {
        let file = self.readable_file(user_id, id)?;
        if !self.store.exists(&file.stored_name).await? {
            tracing::error!(file_id = %file.id, stored_name = %file.stored_name, "Blob missing for file record");
            return Err(DriveError::BlobMissing(file.id));
        }
        Ok(file)
    }

    fn readable_file(&self, user_id: &str, id: &str) -> Result<FileRecord, DriveError> {
        let read_txn = self.db.begin_read()?;
        let file = storage::files::get(&read_txn, id)?.ok_or(DriveError::NotFound)?;
        if !can_read(&read_txn, &file, user_id)? {
            return Err(DriveError::NotFound);
        }
        Ok(file)
    }

    pub(crate) async fn open_blob(&self, file: FileRecord) -> Result<Download, DriveError> {
        match self.store.open(&file.stored_name).await {
            Ok((reader, size)) => Ok(Download { file, reader, size }),
            Err(ContentStoreError::NotFound(_)) => {
                tracing::error!(file_id = %file.id, stored_name = %file.stored_name, "Blob missing for file record");
                Err(DriveError::BlobMissing(file.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Store an uploaded body and place it in a folder.
    ///
    /// When a file with the same name and content already sits in the folder,
    /// its current state is versioned and the new bytes are discarded.
    /// Anything else becomes a new file, even if the name is taken.
    pub async fn upload(&self, owner_id: &str, upload: Upload<'_>) -> Result<UploadOutcome, DriveError> {
        let name = clean_name(&upload.file_name)?;
        let folder_id = upload.folder_id.filter(|id| !id.is_empty());
        {
            let read_txn = self.db.begin_read()?;
            destination(&read_txn, owner_id, folder_id.as_deref())?;
        }
        let mime_type = guess_mime(&name, upload.mime_type);

        let blob = self.store.put_stream(owner_id, upload.body).await?;

        let outcome = {
            let _guard = self.lock(owner_id).await;
            self.record_upload(owner_id, folder_id.as_deref(), &name, &mime_type, &blob)
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.release_blobs(&[blob.stored_id]).await;
                return Err(e);
            }
        };

        if outcome.versioned {
            self.release_blobs(&[blob.stored_id]).await;
            tracing::info!(file_id = %outcome.file.id, "Upload matched existing file, versioned");
            self.sync
                .publish(owner_id, ServerMessage::FileUpdated(outcome.file.clone()));
        } else {
            tracing::info!(file_id = %outcome.file.id, size = outcome.file.size_bytes, "Uploaded file");
            self.sync
                .publish(owner_id, ServerMessage::FileUploaded(outcome.file.clone()));
        }
        Ok(outcome)
    }

    fn record_upload(
        &self,
        owner_id: &str,
        folder_id: Option<&str>,
        name: &str,
        mime_type: &str,
        blob: &StoredBlob,
    ) -> Result<UploadOutcome, DriveError> {
        let write_txn = self.db.begin_write()?;
        // The folder may have been deleted while the body was streaming
        destination(&write_txn, owner_id, folder_id)?;

        let now = Utc::now();
        let existing = storage::files::in_folder(&write_txn, owner_id, folder_id)?
            .into_iter()
            .find(|f| f.display_name == name && f.content_hash == blob.hash);

        let outcome = match existing {
            Some(old) => {
                snapshot(&write_txn, &old, now)?;
                let mut file = old.clone();
                file.updated_at = now;
                storage::files::update(&write_txn, &old, &file)?;
                UploadOutcome {
                    file,
                    versioned: true,
                }
            }
            None => {
                let file = FileRecord {
                    id: Uuid::new_v4().to_string(),
                    stored_name: blob.stored_id.clone(),
                    display_name: name.to_string(),
                    folder_id: folder_id.map(str::to_string),
                    owner_id: owner_id.to_string(),
                    size_bytes: blob.size,
                    mime_type: mime_type.to_string(),
                    content_hash: blob.hash.clone(),
                    created_at: now,
                    updated_at: now,
                };
                storage::files::insert(&write_txn, &file)?;
                UploadOutcome {
                    file,
                    versioned: false,
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Rename a file, versioning its previous state. Renaming to the current
    /// name changes nothing.
    pub async fn rename_file(
        &self,
        owner_id: &str,
        id: &str,
        new_name: &str,
    ) -> Result<FileRecord, DriveError> {
        let name = clean_name(new_name)?;
        let _guard = self.lock(owner_id).await;

        let write_txn = self.db.begin_write()?;
        let old = owned_file(&write_txn, owner_id, id)?;
        if old.display_name == name {
            return Ok(old);
        }

        let now = Utc::now();
        snapshot(&write_txn, &old, now)?;
        let mut file = old.clone();
        file.display_name = name;
        file.updated_at = now;
        storage::files::update(&write_txn, &old, &file)?;
        write_txn.commit()?;

        tracing::info!(file_id = %id, name = %file.display_name, "Renamed file");
        self.sync
            .publish(owner_id, ServerMessage::FileUpdated(file.clone()));
        Ok(file)
    }

    pub async fn move_file(
        &self,
        owner_id: &str,
        id: &str,
        folder_id: Option<&str>,
    ) -> Result<FileRecord, DriveError> {
        let _guard = self.lock(owner_id).await;

        let write_txn = self.db.begin_write()?;
        let old = owned_file(&write_txn, owner_id, id)?;
        destination(&write_txn, owner_id, folder_id)?;
        if storage::files::find_by_name(&write_txn, owner_id, folder_id, &old.display_name, Some(id))?
            .is_some()
        {
            return Err(DriveError::Conflict(format!(
                "a file named '{}' already exists in the destination",
                old.display_name
            )));
        }

        let mut file = old.clone();
        file.folder_id = folder_id.map(str::to_string);
        file.updated_at = Utc::now();
        storage::files::update(&write_txn, &old, &file)?;
        write_txn.commit()?;

        tracing::info!(file_id = %id, folder_id = ?folder_id, "Moved file");
        self.sync
            .publish(owner_id, ServerMessage::FileUpdated(file.clone()));
        Ok(file)
    }

    /// Copy a file into a folder with its own physical blob.
    pub async fn copy_file(
        &self,
        owner_id: &str,
        id: &str,
        folder_id: Option<&str>,
    ) -> Result<FileRecord, DriveError> {
        let _guard = self.lock(owner_id).await;

        let source = {
            let read_txn = self.db.begin_read()?;
            let source = owned_file(&read_txn, owner_id, id)?;
            destination(&read_txn, owner_id, folder_id)?;
            if storage::files::find_by_name(&read_txn, owner_id, folder_id, &source.display_name, None)?
                .is_some()
            {
                return Err(DriveError::Conflict(format!(
                    "a file named '{}' already exists in the destination",
                    source.display_name
                )));
            }
            source
        };

        let blob = match self.store.copy(&source.stored_name, owner_id).await {
            Ok(blob) => blob,
            Err(ContentStoreError::NotFound(_)) => {
                tracing::error!(file_id = %id, stored_name = %source.stored_name, "Blob missing for file record");
                return Err(DriveError::BlobMissing(source.id));
            }
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let file = FileRecord {
            id: Uuid::new_v4().to_string(),
            stored_name: blob.stored_id.clone(),
            display_name: source.display_name,
            folder_id: folder_id.map(str::to_string),
            owner_id: owner_id.to_string(),
            size_bytes: blob.size,
            mime_type: source.mime_type,
            content_hash: blob.hash,
            created_at: now,
            updated_at: now,
        };
        let inserted = self.db.begin_write().map_err(DriveError::from).and_then(|write_txn| {
            storage::files::insert(&write_txn, &file)?;
            write_txn.commit()?;
            Ok(())
        });
        if let Err(e) = inserted {
            self.release_blobs(&[blob.stored_id]).await;
            return Err(e);
        }

        tracing::info!(file_id = %file.id, source_id = %id, "Copied file");
        self.sync
            .publish(owner_id, ServerMessage::FileUploaded(file.clone()));
        Ok(file)
    }

    /// Delete a file with its versions and shares, then release its blobs.
    pub async fn delete_file(&self, owner_id: &str, id: &str) -> Result<(), DriveError> {
        let _guard = self.lock(owner_id).await;

        let blobs = {
            let write_txn = self.db.begin_write()?;
            let file = owned_file(&write_txn, owner_id, id)?;
            let blobs = storage::files::remove(&write_txn, &file)?;
            write_txn.commit()?;
            blobs
        };
        self.release_blobs(&blobs).await;

        tracing::info!(file_id = %id, "Deleted file");
        self.sync.publish(
            owner_id,
            ServerMessage::FileDeleted(Removed { id: id.to_string() }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("q1.pdf", None), "application/pdf");
        assert_eq!(
            guess_mime("q1.pdf", Some("application/octet-stream".to_string())),
            "application/pdf"
        );
        assert_eq!(guess_mime("notes", Some("text/plain".to_string())), "text/plain");
        assert_eq!(guess_mime("blob.unknownext", None), "application/octet-stream");
    }
}
