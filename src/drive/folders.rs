use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use super::tree::{ancestry, is_within, join_path, rewrite_descendant_paths, subtree};
use super::{clean_name, destination, owned_folder, Drive, DriveError};
use crate::content_store::ContentStoreError;
use crate::storage::models::{FileRecord, FolderRecord, DEFAULT_FOLDER_COLOR};
use crate::storage::{self, DatabaseError, Reader};
use crate::sync::{Removed, ServerMessage};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FolderCounts {
    pub files: usize,
    pub children: usize,
}

/// A folder with the number of files and sub-folders directly inside it.
#[derive(Debug, Clone, Serialize)]
pub struct FolderSummary {
    #[serde(flatten)]
    pub folder: FolderRecord,
    pub counts: FolderCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderListing {
    pub folders: Vec<FolderSummary>,
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FolderPatch {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSummary {
    pub deleted_files: usize,
    pub deleted_folders: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    pub folder: FolderRecord,
    /// Top-level ancestor first, the folder itself last.
    pub breadcrumb_path: Vec<FolderRecord>,
}

fn summarize<R: Reader>(reader: &R, folder: FolderRecord) -> Result<FolderSummary, DatabaseError> {
    let counts = FolderCounts {
        files: storage::files::ids_in(reader, &folder.owner_id, Some(&folder.id))?.len(),
        children: storage::folders::child_ids(reader, &folder.owner_id, Some(&folder.id))?.len(),
    };
    Ok(FolderSummary { folder, counts })
}

/// Case-insensitive substring match on display names, newest first.
pub(crate) fn filter_files(mut files: Vec<FileRecord>, search: Option<&str>) -> Vec<FileRecord> {
    if let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) {
        let needle = needle.to_lowercase();
        files.retain(|f| f.display_name.to_lowercase().contains(&needle));
    }
    files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    files
}

fn pick_color(color: Option<&str>) -> Option<String> {
    color
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

impl Drive {
    // ========================================================================
    // Reads
    // ========================================================================

    /// Direct contents of a folder (`None` for the account root).
    pub fn list_folder(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
        search: Option<&str>,
    ) -> Result<FolderListing, DriveError> {
        let read_txn = self.db.begin_read()?;
        destination(&read_txn, owner_id, parent_id)?;

        let mut children = storage::folders::children(&read_txn, owner_id, parent_id)?;
        children.sort_by(|a, b| a.name.cmp(&b.name));
        let folders = children
            .into_iter()
            .map(|f| summarize(&read_txn, f))
            .collect::<Result<Vec<_>, _>>()?;

        let files = filter_files(
            storage::files::in_folder(&read_txn, owner_id, parent_id)?,
            search,
        );

        Ok(FolderListing { folders, files })
    }

    /// Every folder of the account, ordered by path.
    pub fn list_all_folders(&self, owner_id: &str) -> Result<Vec<FolderSummary>, DriveError> {
        let read_txn = self.db.begin_read()?;
        let mut folders = storage::folders::all_for_owner(&read_txn, owner_id)?;
        folders.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(folders
            .into_iter()
            .map(|f| summarize(&read_txn, f))
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_folder(&self, owner_id: &str, id: &str) -> Result<FolderSummary, DriveError> {
        let read_txn = self.db.begin_read()?;
        let folder = owned_folder(&read_txn, owner_id, id)?;
        Ok(summarize(&read_txn, folder)?)
    }

    pub fn breadcrumb(&self, owner_id: &str, id: &str) -> Result<Breadcrumb, DriveError> {
        let read_txn = self.db.begin_read()?;
        let folder = owned_folder(&read_txn, owner_id, id)?;
        let breadcrumb_path = ancestry(&read_txn, &folder)?;
        Ok(Breadcrumb {
            folder,
            breadcrumb_path,
        })
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub async fn create_folder(
        &self,
        owner_id: &str,
        name: &str,
        parent_id: Option<&str>,
        color: Option<&str>,
    ) -> Result<FolderRecord, DriveError> {
        let name = clean_name(name)?;
        let _guard = self.lock(owner_id).await;

        let write_txn = self.db.begin_write()?;
        let parent = destination(&write_txn, owner_id, parent_id)?;
        if storage::folders::id_by_name(&write_txn, owner_id, parent_id, &name)?.is_some() {
            return Err(DriveError::Conflict(format!(
                "a folder named '{name}' already exists here"
            )));
        }

        let now = Utc::now();
        let folder = FolderRecord {
            id: Uuid::new_v4().to_string(),
            path: join_path(parent.as_ref(), &name),
            name,
            parent_id: parent_id.map(str::to_string),
            owner_id: owner_id.to_string(),
            color: pick_color(color).unwrap_or_else(|| DEFAULT_FOLDER_COLOR.to_string()),
            created_at: now,
            updated_at: now,
        };
        storage::folders::insert(&write_txn, &folder)?;
        write_txn.commit()?;

        tracing::info!(folder_id = %folder.id, path = %folder.path, "Created folder");
        self.sync
            .publish(owner_id, ServerMessage::FolderCreated(folder.clone()));
        Ok(folder)
    }

    /// Rename and/or recolor a folder. A rename rewrites the path of the whole
    /// subtree in the same transaction.
    pub async fn update_folder(
        &self,
        owner_id: &str,
        id: &str,
        patch: FolderPatch,
    ) -> Result<FolderRecord, DriveError> {
        let new_name = patch.name.as_deref().map(clean_name).transpose()?;
        let _guard = self.lock(owner_id).await;

        let write_txn = self.db.begin_write()?;
        let old = owned_folder(&write_txn, owner_id, id)?;
        let mut new = old.clone();

        if let Some(name) = new_name.filter(|n| *n != old.name) {
            let parent_id = old.parent_id.as_deref();
            if storage::folders::id_by_name(&write_txn, owner_id, parent_id, &name)?
                .is_some_and(|other| other != old.id)
            {
                return Err(DriveError::Conflict(format!(
                    "a folder named '{name}' already exists here"
                )));
            }
            let parent = destination(&write_txn, owner_id, parent_id)?;
            new.path = join_path(parent.as_ref(), &name);
            new.name = name;
        }
        if let Some(color) = pick_color(patch.color.as_deref()) {
            new.color = color;
        }

        let now = Utc::now();
        new.updated_at = now;
        storage::folders::update(&write_txn, &old, &new)?;
        if new.path != old.path {
            let rewritten = rewrite_descendant_paths(&write_txn, &new, now)?;
            tracing::debug!(folder_id = %id, rewritten, "Rewrote descendant paths");
        }
        write_txn.commit()?;

        tracing::info!(folder_id = %id, path = %new.path, "Updated folder");
        self.sync
            .publish(owner_id, ServerMessage::FolderUpdated(new.clone()));
        Ok(new)
    }

    pub async fn move_folder(
        &self,
        owner_id: &str,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<FolderRecord, DriveError> {
        let _guard = self.lock(owner_id).await;

        let write_txn = self.db.begin_write()?;
        let old = owned_folder(&write_txn, owner_id, id)?;
        let parent = destination(&write_txn, owner_id, new_parent_id)?;
        if let Some(parent) = &parent {
            if parent.id == id {
                return Err(DriveError::InvalidHierarchy(
                    "a folder cannot be moved into itself".to_string(),
                ));
            }
            if is_within(&write_txn, &parent.id, id)? {
                return Err(DriveError::InvalidHierarchy(
                    "a folder cannot be moved into one of its descendants".to_string(),
                ));
            }
        }
        if storage::folders::id_by_name(&write_txn, owner_id, new_parent_id, &old.name)?
            .is_some_and(|other| other != old.id)
        {
            return Err(DriveError::Conflict(format!(
                "a folder named '{}' already exists in the destination",
                old.name
            )));
        }

        let now = Utc::now();
        let mut new = old.clone();
        new.parent_id = new_parent_id.map(str::to_string);
        new.path = join_path(parent.as_ref(), &old.name);
        new.updated_at = now;
        storage::folders::update(&write_txn, &old, &new)?;
        if new.path != old.path {
            rewrite_descendant_paths(&write_txn, &new, now)?;
        }
        write_txn.commit()?;

        tracing::info!(folder_id = %id, from = %old.path, to = %new.path, "Moved folder");
        self.sync
            .publish(owner_id, ServerMessage::FolderUpdated(new.clone()));
        Ok(new)
    }

    /// Deep-copy a folder under `dest_parent_id`. Folders are created parent
    /// first and committed one at a time; files whose blob cannot be copied
    /// are skipped.
    pub async fn copy_folder(
        &self,
        owner_id: &str,
        id: &str,
        dest_parent_id: Option<&str>,
    ) -> Result<FolderRecord, DriveError> {
        let _guard = self.lock(owner_id).await;
        let deadline = self.deadline();

        let (source_tree, dest) = {
            let read_txn = self.db.begin_read()?;
            let source = owned_folder(&read_txn, owner_id, id)?;
            let dest = destination(&read_txn, owner_id, dest_parent_id)?;
            if let Some(dest) = &dest {
                if is_within(&read_txn, &dest.id, id)? {
                    return Err(DriveError::InvalidHierarchy(
                        "a folder cannot be copied into itself".to_string(),
                    ));
                }
            }
            if storage::folders::id_by_name(&read_txn, owner_id, dest_parent_id, &source.name)?
                .is_some()
            {
                return Err(DriveError::Conflict(format!(
                    "a folder named '{}' already exists in the destination",
                    source.name
                )));
            }
            (subtree(&read_txn, &source)?, dest)
        };

        let mut copies: HashMap<String, FolderRecord> = HashMap::new();
        let mut root_copy: Option<FolderRecord> = None;
        let mut copied_files = 0;
        let mut skipped_files = 0;
        let mut interrupted = false;

        for source in &source_tree {
            if Instant::now() >= deadline {
                interrupted = true;
                break;
            }

            let parent = if source.id == id {
                dest.clone()
            } else {
                match source.parent_id.as_ref().and_then(|p| copies.get(p)) {
                    Some(parent) => Some(parent.clone()),
                    None => {
                        tracing::warn!(folder_id = %source.id, "Parent copy missing, skipping folder");
                        continue;
                    }
                }
            };

            let now = Utc::now();
            let copy = FolderRecord {
                id: Uuid::new_v4().to_string(),
                name: source.name.clone(),
                path: join_path(parent.as_ref(), &source.name),
                parent_id: parent.as_ref().map(|p| p.id.clone()),
                owner_id: owner_id.to_string(),
                color: source.color.clone(),
                created_at: now,
                updated_at: now,
            };
            let write_txn = self.db.begin_write()?;
            storage::folders::insert(&write_txn, &copy)?;
            write_txn.commit()?;
            if root_copy.is_none() {
                root_copy = Some(copy.clone());
            }

            let files = {
                let read_txn = self.db.begin_read()?;
                storage::files::in_folder(&read_txn, owner_id, Some(&source.id))?
            };
            let mut new_files = Vec::new();
            for file in files {
                if Instant::now() >= deadline {
                    interrupted = true;
                    break;
                }
                match self.store.copy(&file.stored_name, owner_id).await {
                    Ok(blob) => {
                        let now = Utc::now();
                        new_files.push(FileRecord {
                            id: Uuid::new_v4().to_string(),
                            stored_name: blob.stored_id,
                            display_name: file.display_name,
                            folder_id: Some(copy.id.clone()),
                            owner_id: owner_id.to_string(),
                            size_bytes: blob.size,
                            mime_type: file.mime_type,
                            content_hash: blob.hash,
                            created_at: now,
                            updated_at: now,
                        });
                    }
                    Err(ContentStoreError::NotFound(_)) => {
                        tracing::warn!(file_id = %file.id, stored_name = %file.stored_name, "Blob missing, skipping file in folder copy");
                        skipped_files += 1;
                    }
                    Err(e) => {
                        tracing::warn!(file_id = %file.id, "Failed to copy blob, skipping file: {}", e);
                        skipped_files += 1;
                    }
                }
            }

            if let Err(e) = self.insert_files(&new_files) {
                let blobs: Vec<String> = new_files.into_iter().map(|f| f.stored_name).collect();
                self.release_blobs(&blobs).await;
                return Err(e);
            }
            copied_files += new_files.len();
            copies.insert(source.id.clone(), copy);

            if interrupted {
                break;
            }
        }

        let Some(root) = root_copy else {
            tracing::warn!(folder_id = %id, "Folder copy timed out before starting");
            return Err(DriveError::Interrupted(
                "copy stopped before any folder was created".to_string(),
            ));
        };
        self.sync
            .publish(owner_id, ServerMessage::FolderCreated(root.clone()));

        if interrupted {
            tracing::warn!(folder_id = %id, copy_id = %root.id, copied_files, "Folder copy timed out");
            return Err(DriveError::Interrupted(format!(
                "copy stopped after {} folders and {} files",
                copies.len(),
                copied_files
            )));
        }

        tracing::info!(
            folder_id = %id,
            copy_id = %root.id,
            folders = copies.len(),
            copied_files,
            skipped_files,
            "Copied folder"
        );
        Ok(root)
    }

    /// Delete a folder. Without `force` only an empty folder is removed. With
    /// it, the subtree is removed deepest folder first, one commit per folder,
    /// and blobs are released after their records are gone.
    pub async fn delete_folder(
        &self,
        owner_id: &str,
        id: &str,
        force: bool,
    ) -> Result<DeleteSummary, DriveError> {
        let _guard = self.lock(owner_id).await;
        let deadline = self.deadline();

        let tree = {
            let read_txn = self.db.begin_read()?;
            let folder = owned_folder(&read_txn, owner_id, id)?;
            let files_count = storage::files::ids_in(&read_txn, owner_id, Some(id))?.len();
            let children_count =
                storage::folders::child_ids(&read_txn, owner_id, Some(id))?.len();
            if !force && (files_count > 0 || children_count > 0) {
                return Err(DriveError::NotEmpty {
                    files_count,
                    children_count,
                });
            }
            subtree(&read_txn, &folder)?
        };

        let mut summary = DeleteSummary::default();
        for folder in tree.iter().rev() {
            if Instant::now() >= deadline {
                tracing::warn!(folder_id = %id, ?summary, "Folder delete timed out");
                if let Some(root) = tree.first() {
                    self.sync
                        .publish(owner_id, ServerMessage::FolderUpdated(root.clone()));
                }
                return Err(DriveError::Interrupted(format!(
                    "delete stopped after {} folders and {} files",
                    summary.deleted_folders, summary.deleted_files
                )));
            }

            let write_txn = self.db.begin_write()?;
            let mut blobs = Vec::new();
            let files = storage::files::in_folder(&write_txn, owner_id, Some(&folder.id))?;
            for file in &files {
                blobs.extend(storage::files::remove(&write_txn, file)?);
            }
            storage::folders::remove(&write_txn, folder)?;
            write_txn.commit()?;

            summary.deleted_files += files.len();
            summary.deleted_folders += 1;
            self.release_blobs(&blobs).await;
        }

        tracing::info!(
            folder_id = %id,
            deleted_files = summary.deleted_files,
            deleted_folders = summary.deleted_folders,
            "Deleted folder"
        );
        self.sync.publish(
            owner_id,
            ServerMessage::FolderDeleted(Removed { id: id.to_string() }),
        );
        Ok(summary)
    }

    fn insert_files(&self, files: &[FileRecord]) -> Result<(), DriveError> {
        if files.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write()?;
        for file in files {
            storage::files::insert(&write_txn, file)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
