use redb::WriteTransaction;

use super::db::{
    add_id, get_ids, get_lookup, get_record, put_lookup, put_record, remove_id, remove_lookup,
    remove_record, DatabaseError, Reader,
};
use super::models::ShareRecord;
use super::tables::*;

pub fn get<R: Reader>(reader: &R, id: &str) -> Result<Option<ShareRecord>, DatabaseError> {
    get_record(reader, SHARES, id)
}

/// Resolve a public token (token -> uuid -> share)
pub fn by_token<R: Reader>(reader: &R, token: &str) -> Result<Option<ShareRecord>, DatabaseError> {
    match get_lookup(reader, SHARE_TOKENS, token)? {
        Some(id) => get(reader, &id),
        None => Ok(None),
    }
}

/// Shares of a file, newest first.
pub fn for_file<R: Reader>(reader: &R, file_id: &str) -> Result<Vec<ShareRecord>, DatabaseError> {
    let mut shares = Vec::new();
    for id in get_ids(reader, FILE_SHARES, file_id)? {
        if let Some(share) = get(reader, &id)? {
            shares.push(share);
        }
    }
    shares.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(shares)
}

pub fn insert(txn: &WriteTransaction, share: &ShareRecord) -> Result<(), DatabaseError> {
    put_record(txn, SHARES, &share.id, share)?;
    put_lookup(txn, SHARE_TOKENS, &share.token, &share.id)?;
    add_id(txn, FILE_SHARES, &share.file_id, &share.id)
}

/// Overwrite the mutable counters of an existing share
pub fn update(txn: &WriteTransaction, share: &ShareRecord) -> Result<(), DatabaseError> {
    put_record(txn, SHARES, &share.id, share)
}

pub fn remove(txn: &WriteTransaction, share: &ShareRecord) -> Result<(), DatabaseError> {
    remove_lookup(txn, SHARE_TOKENS, &share.token)?;
    remove_id(txn, FILE_SHARES, &share.file_id, &share.id)?;
    remove_record(txn, SHARES, &share.id)?;
    Ok(())
}

pub fn remove_for_file(txn: &WriteTransaction, file_id: &str) -> Result<(), DatabaseError> {
    for share in for_file(txn, file_id)? {
        remove(txn, &share)?;
    }
    Ok(())
}
