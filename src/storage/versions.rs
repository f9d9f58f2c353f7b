use redb::WriteTransaction;

use super::db::{add_id, get_ids, get_record, put_record, remove_record, DatabaseError, Reader};
use super::models::FileVersion;
use super::tables::*;

pub fn get<R: Reader>(reader: &R, id: &str) -> Result<Option<FileVersion>, DatabaseError> {
    get_record(reader, FILE_VERSIONS, id)
}

/// All versions of a file, oldest first.
pub fn list<R: Reader>(reader: &R, file_id: &str) -> Result<Vec<FileVersion>, DatabaseError> {
    let mut versions = Vec::new();
    for id in get_ids(reader, FILE_VERSION_INDEX, file_id)? {
        if let Some(version) = get(reader, &id)? {
            versions.push(version);
        }
    }
    versions.sort_by_key(|v| v.version_number);
    Ok(versions)
}

/// Highest version number recorded for a file, 0 when none.
pub fn latest_number<R: Reader>(reader: &R, file_id: &str) -> Result<u32, DatabaseError> {
    Ok(list(reader, file_id)?
        .iter()
        .map(|v| v.version_number)
        .max()
        .unwrap_or(0))
}

pub fn append(txn: &WriteTransaction, version: &FileVersion) -> Result<(), DatabaseError> {
    put_record(txn, FILE_VERSIONS, &version.id, version)?;
    add_id(txn, FILE_VERSION_INDEX, &version.file_id, &version.id)
}

/// Drop every version of a file, returning what was removed.
pub fn remove_all(
    txn: &WriteTransaction,
    file_id: &str,
) -> Result<Vec<FileVersion>, DatabaseError> {
    let versions = list(txn, file_id)?;
    for version in &versions {
        remove_record(txn, FILE_VERSIONS, &version.id)?;
    }
    remove_record(txn, FILE_VERSION_INDEX, file_id)?;
    Ok(versions)
}
