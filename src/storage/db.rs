use redb::{
    Database as RedbDatabase, Key, ReadTransaction, ReadableTable, ReadableTableMetadata,
    TableDefinition, Value, WriteTransaction,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

/// Statistics from a purge operation
#[derive(Debug, Default)]
pub struct PurgeStats {
    pub files: u64,
    pub folders: u64,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("cloud-drive.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        // Read transactions fail on tables that were never created
        let write_txn = db.begin_write()?;
        {
            for table in ALL_RECORD_TABLES {
                let _ = write_txn.open_table(table)?;
            }
            for table in ALL_LOOKUP_TABLES {
                let _ = write_txn.open_table(table)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    // ========================================================================
    // Admin operations
    // ========================================================================

    /// Purge all data - for testing only
    pub fn purge_all(&self) -> Result<PurgeStats, DatabaseError> {
        let write_txn = self.begin_write()?;
        let stats = PurgeStats {
            files: write_txn.open_table(FILES)?.len()?,
            folders: write_txn.open_table(FOLDERS)?.len()?,
        };

        for table in ALL_RECORD_TABLES {
            write_txn.delete_table(table)?;
            let _ = write_txn.open_table(table)?;
        }
        for table in ALL_LOOKUP_TABLES {
            write_txn.delete_table(table)?;
            let _ = write_txn.open_table(table)?;
        }

        write_txn.commit()?;
        Ok(stats)
    }
}

// ============================================================================
// Transaction-generic access
// ============================================================================

/// Read access shared by read and write transactions, so lookups used while
/// validating a mutation see the same snapshot the mutation commits against.
pub trait Reader {
    fn table<K: Key + 'static, V: Value + 'static>(
        &self,
        definition: TableDefinition<K, V>,
    ) -> Result<impl ReadableTable<K, V> + '_, DatabaseError>;
}

impl Reader for ReadTransaction {
    fn table<K: Key + 'static, V: Value + 'static>(
        &self,
        definition: TableDefinition<K, V>,
    ) -> Result<impl ReadableTable<K, V> + '_, DatabaseError> {
        Ok(self.open_table(definition)?)
    }
}

impl Reader for WriteTransaction {
    fn table<K: Key + 'static, V: Value + 'static>(
        &self,
        definition: TableDefinition<K, V>,
    ) -> Result<impl ReadableTable<K, V> + '_, DatabaseError> {
        Ok(self.open_table(definition)?)
    }
}

pub(crate) fn get_record<R: Reader, T: DeserializeOwned>(
    reader: &R,
    table: RecordTable,
    key: &str,
) -> Result<Option<T>, DatabaseError> {
    let table = reader.table(table)?;
    let result = match table.get(key)? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };
    Ok(result)
}

pub(crate) fn put_record<T: Serialize>(
    txn: &WriteTransaction,
    table: RecordTable,
    key: &str,
    value: &T,
) -> Result<(), DatabaseError> {
    let data = rmp_serde::to_vec_named(value)?;
    let mut table = txn.open_table(table)?;
    table.insert(key, data.as_slice())?;
    Ok(())
}

pub(crate) fn remove_record(
    txn: &WriteTransaction,
    table: RecordTable,
    key: &str,
) -> Result<bool, DatabaseError> {
    let mut table = txn.open_table(table)?;
    let removed = table.remove(key)?.is_some();
    Ok(removed)
}

/// Decode every record of a table.
pub(crate) fn scan_records<R: Reader, T: DeserializeOwned>(
    reader: &R,
    table: RecordTable,
) -> Result<Vec<T>, DatabaseError> {
    let table = reader.table(table)?;
    let mut records = Vec::new();
    for result in table.iter()? {
        let (_, value) = result?;
        records.push(rmp_serde::from_slice(value.value())?);
    }
    Ok(records)
}

pub(crate) fn get_lookup<R: Reader>(
    reader: &R,
    table: LookupTable,
    key: &str,
) -> Result<Option<String>, DatabaseError> {
    let table = reader.table(table)?;
    let result = table.get(key)?.map(|v| v.value().to_string());
    Ok(result)
}

pub(crate) fn put_lookup(
    txn: &WriteTransaction,
    table: LookupTable,
    key: &str,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut table = txn.open_table(table)?;
    table.insert(key, id)?;
    Ok(())
}

pub(crate) fn remove_lookup(
    txn: &WriteTransaction,
    table: LookupTable,
    key: &str,
) -> Result<(), DatabaseError> {
    let mut table = txn.open_table(table)?;
    table.remove(key)?;
    Ok(())
}

/// Read an id-list index entry; a missing entry is an empty list.
pub(crate) fn get_ids<R: Reader>(
    reader: &R,
    table: RecordTable,
    key: &str,
) -> Result<Vec<String>, DatabaseError> {
    Ok(get_record(reader, table, key)?.unwrap_or_default())
}

pub(crate) fn add_id(
    txn: &WriteTransaction,
    table: RecordTable,
    key: &str,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut ids = get_ids(txn, table, key)?;
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
        put_record(txn, table, key, &ids)?;
    }
    Ok(())
}

/// Remove an id from a list index, dropping the entry once it is empty.
pub(crate) fn remove_id(
    txn: &WriteTransaction,
    table: RecordTable,
    key: &str,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut ids = get_ids(txn, table, key)?;
    let before = ids.len();
    ids.retain(|existing| existing != id);
    if ids.len() == before {
        return Ok(());
    }
    if ids.is_empty() {
        remove_record(txn, table, key)?;
    } else {
        put_record(txn, table, key, &ids)?;
    }
    Ok(())
}
