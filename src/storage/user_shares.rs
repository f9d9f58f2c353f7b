use redb::WriteTransaction;

use super::db::{
    add_id, get_ids, get_lookup, get_record, put_lookup, put_record, remove_id, remove_lookup,
    remove_record, DatabaseError, Reader,
};
use super::models::UserShareRecord;
use super::tables::*;

pub fn get<R: Reader>(reader: &R, id: &str) -> Result<Option<UserShareRecord>, DatabaseError> {
    get_record(reader, USER_SHARES, id)
}

/// The grant of `file_id` to `user_id`, if any.
pub fn for_pair<R: Reader>(
    reader: &R,
    file_id: &str,
    user_id: &str,
) -> Result<Option<UserShareRecord>, DatabaseError> {
    match get_lookup(reader, USER_SHARE_PAIRS, &pair_key(file_id, user_id))? {
        Some(id) => get(reader, &id),
        None => Ok(None),
    }
}

fn load_all<R: Reader>(
    reader: &R,
    table: RecordTable,
    key: &str,
) -> Result<Vec<UserShareRecord>, DatabaseError> {
    let mut grants = Vec::new();
    for id in get_ids(reader, table, key)? {
        if let Some(grant) = get(reader, &id)? {
            grants.push(grant);
        }
    }
    grants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(grants)
}

/// Grants on a file, newest first.
pub fn for_file<R: Reader>(
    reader: &R,
    file_id: &str,
) -> Result<Vec<UserShareRecord>, DatabaseError> {
    load_all(reader, FILE_USER_SHARES, file_id)
}

/// Grants received by a user, newest first.
pub fn shared_with<R: Reader>(
    reader: &R,
    user_id: &str,
) -> Result<Vec<UserShareRecord>, DatabaseError> {
    load_all(reader, SHARED_WITH, user_id)
}

pub fn insert(txn: &WriteTransaction, grant: &UserShareRecord) -> Result<(), DatabaseError> {
    put_record(txn, USER_SHARES, &grant.id, grant)?;
    put_lookup(
        txn,
        USER_SHARE_PAIRS,
        &pair_key(&grant.file_id, &grant.shared_with_user_id),
        &grant.id,
    )?;
    add_id(txn, FILE_USER_SHARES, &grant.file_id, &grant.id)?;
    add_id(txn, SHARED_WITH, &grant.shared_with_user_id, &grant.id)
}

pub fn remove(txn: &WriteTransaction, grant: &UserShareRecord) -> Result<(), DatabaseError> {
    remove_lookup(
        txn,
        USER_SHARE_PAIRS,
        &pair_key(&grant.file_id, &grant.shared_with_user_id),
    )?;
    remove_id(txn, FILE_USER_SHARES, &grant.file_id, &grant.id)?;
    remove_id(txn, SHARED_WITH, &grant.shared_with_user_id, &grant.id)?;
    remove_record(txn, USER_SHARES, &grant.id)?;
    Ok(())
}

pub fn remove_for_file(txn: &WriteTransaction, file_id: &str) -> Result<(), DatabaseError> {
    for grant in for_file(txn, file_id)? {
        remove(txn, &grant)?;
    }
    Ok(())
}
