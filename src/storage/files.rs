use redb::WriteTransaction;

use super::db::{
    add_id, get_ids, get_record, put_record, remove_id, remove_record, scan_records,
    DatabaseError, Reader,
};
use super::models::FileRecord;
use super::tables::*;
use super::{shares, user_shares, versions};

// ============================================================================
// File reads
// ============================================================================

/// Get a file by its UUID
pub fn get<R: Reader>(reader: &R, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
    get_record(reader, FILES, id)
}

pub fn ids_in<R: Reader>(
    reader: &R,
    owner_id: &str,
    folder_id: Option<&str>,
) -> Result<Vec<String>, DatabaseError> {
    get_ids(reader, FOLDER_FILES, &scope_key(owner_id, folder_id))
}

/// Files placed directly in `folder_id` (root when `None`).
pub fn in_folder<R: Reader>(
    reader: &R,
    owner_id: &str,
    folder_id: Option<&str>,
) -> Result<Vec<FileRecord>, DatabaseError> {
    let mut files = Vec::new();
    for id in ids_in(reader, owner_id, folder_id)? {
        if let Some(file) = get(reader, &id)? {
            files.push(file);
        }
    }
    Ok(files)
}

/// First file in the folder carrying `display_name`, ignoring `exclude_id`.
pub fn find_by_name<R: Reader>(
    reader: &R,
    owner_id: &str,
    folder_id: Option<&str>,
    display_name: &str,
    exclude_id: Option<&str>,
) -> Result<Option<FileRecord>, DatabaseError> {
    Ok(in_folder(reader, owner_id, folder_id)?
        .into_iter()
        .find(|f| f.display_name == display_name && Some(f.id.as_str()) != exclude_id))
}

pub fn all_for_owner<R: Reader>(
    reader: &R,
    owner_id: &str,
) -> Result<Vec<FileRecord>, DatabaseError> {
    let all: Vec<FileRecord> = scan_records(reader, FILES)?;
    Ok(all.into_iter().filter(|f| f.owner_id == owner_id).collect())
}

// ============================================================================
// File writes
// ============================================================================

/// Store a new file and register it in its folder's placement index
pub fn insert(txn: &WriteTransaction, file: &FileRecord) -> Result<(), DatabaseError> {
    debug_assert!(!file.id.is_empty(), "file id must not be empty");

    put_record(txn, FILES, &file.id, file)?;
    add_id(
        txn,
        FOLDER_FILES,
        &scope_key(&file.owner_id, file.folder_id.as_deref()),
        &file.id,
    )
}

/// Overwrite a file, moving its placement entry when the folder changed
pub fn update(
    txn: &WriteTransaction,
    old: &FileRecord,
    new: &FileRecord,
) -> Result<(), DatabaseError> {
    debug_assert_eq!(old.id, new.id);

    if old.folder_id != new.folder_id {
        remove_id(
            txn,
            FOLDER_FILES,
            &scope_key(&old.owner_id, old.folder_id.as_deref()),
            &old.id,
        )?;
        add_id(
            txn,
            FOLDER_FILES,
            &scope_key(&new.owner_id, new.folder_id.as_deref()),
            &new.id,
        )?;
    }
    put_record(txn, FILES, &new.id, new)
}

/// Remove a file together with its versions and every share pointing at it.
///
/// Returns the content store keys the file and its versions referenced, so
/// the caller can release the blobs once the transaction has committed.
pub fn remove(txn: &WriteTransaction, file: &FileRecord) -> Result<Vec<String>, DatabaseError> {
    let mut blobs = vec![file.stored_name.clone()];
    for version in versions::remove_all(txn, &file.id)? {
        if !blobs.contains(&version.stored_name) {
            blobs.push(version.stored_name);
        }
    }
    shares::remove_for_file(txn, &file.id)?;
    user_shares::remove_for_file(txn, &file.id)?;

    remove_id(
        txn,
        FOLDER_FILES,
        &scope_key(&file.owner_id, file.folder_id.as_deref()),
        &file.id,
    )?;
    remove_record(txn, FILES, &file.id)?;
    Ok(blobs)
}
