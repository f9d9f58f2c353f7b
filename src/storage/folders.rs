use redb::WriteTransaction;

use super::db::{
    add_id, get_ids, get_lookup, get_record, put_lookup, put_record, remove_id, remove_lookup,
    remove_record, scan_records, DatabaseError, Reader,
};
use super::models::FolderRecord;
use super::tables::*;

// ============================================================================
// Folder reads
// ============================================================================

pub fn get<R: Reader>(reader: &R, id: &str) -> Result<Option<FolderRecord>, DatabaseError> {
    get_record(reader, FOLDERS, id)
}

/// Ids of the direct sub-folders of `parent_id` (root when `None`).
pub fn child_ids<R: Reader>(
    reader: &R,
    owner_id: &str,
    parent_id: Option<&str>,
) -> Result<Vec<String>, DatabaseError> {
    get_ids(reader, FOLDER_CHILDREN, &scope_key(owner_id, parent_id))
}

pub fn children<R: Reader>(
    reader: &R,
    owner_id: &str,
    parent_id: Option<&str>,
) -> Result<Vec<FolderRecord>, DatabaseError> {
    let mut folders = Vec::new();
    for id in child_ids(reader, owner_id, parent_id)? {
        if let Some(folder) = get(reader, &id)? {
            folders.push(folder);
        }
    }
    Ok(folders)
}

/// Resolve a sibling name to the folder holding it.
pub fn id_by_name<R: Reader>(
    reader: &R,
    owner_id: &str,
    parent_id: Option<&str>,
    name: &str,
) -> Result<Option<String>, DatabaseError> {
    get_lookup(reader, FOLDER_NAMES, &name_key(owner_id, parent_id, name))
}

/// Every folder of an account.
pub fn all_for_owner<R: Reader>(
    reader: &R,
    owner_id: &str,
) -> Result<Vec<FolderRecord>, DatabaseError> {
    let all: Vec<FolderRecord> = scan_records(reader, FOLDERS)?;
    Ok(all.into_iter().filter(|f| f.owner_id == owner_id).collect())
}

// ============================================================================
// Folder writes
// ============================================================================

/// Store a new folder and register it in the child and name indexes
pub fn insert(txn: &WriteTransaction, folder: &FolderRecord) -> Result<(), DatabaseError> {
    debug_assert!(!folder.id.is_empty(), "folder id must not be empty");

    let parent = folder.parent_id.as_deref();
    put_record(txn, FOLDERS, &folder.id, folder)?;
    add_id(
        txn,
        FOLDER_CHILDREN,
        &scope_key(&folder.owner_id, parent),
        &folder.id,
    )?;
    put_lookup(
        txn,
        FOLDER_NAMES,
        &name_key(&folder.owner_id, parent, &folder.name),
        &folder.id,
    )?;
    Ok(())
}

/// Overwrite a folder, moving its index entries when name or parent changed
pub fn update(
    txn: &WriteTransaction,
    old: &FolderRecord,
    new: &FolderRecord,
) -> Result<(), DatabaseError> {
    debug_assert_eq!(old.id, new.id);

    let old_parent = old.parent_id.as_deref();
    let new_parent = new.parent_id.as_deref();

    if old_parent != new_parent {
        remove_id(
            txn,
            FOLDER_CHILDREN,
            &scope_key(&old.owner_id, old_parent),
            &old.id,
        )?;
        add_id(
            txn,
            FOLDER_CHILDREN,
            &scope_key(&new.owner_id, new_parent),
            &new.id,
        )?;
    }

    if old_parent != new_parent || old.name != new.name {
        remove_lookup(
            txn,
            FOLDER_NAMES,
            &name_key(&old.owner_id, old_parent, &old.name),
        )?;
        put_lookup(
            txn,
            FOLDER_NAMES,
            &name_key(&new.owner_id, new_parent, &new.name),
            &new.id,
        )?;
    }

    put_record(txn, FOLDERS, &new.id, new)
}

/// Remove a folder row and its index entries. Contents are not touched.
pub fn remove(txn: &WriteTransaction, folder: &FolderRecord) -> Result<bool, DatabaseError> {
    let parent = folder.parent_id.as_deref();
    remove_id(
        txn,
        FOLDER_CHILDREN,
        &scope_key(&folder.owner_id, parent),
        &folder.id,
    )?;
    remove_lookup(
        txn,
        FOLDER_NAMES,
        &name_key(&folder.owner_id, parent, &folder.name),
    )?;
    remove_record(txn, FOLDERS, &folder.id)
}
