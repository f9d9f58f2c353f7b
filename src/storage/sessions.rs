use redb::WriteTransaction;

use super::db::{get_record, put_record, remove_record, Database, DatabaseError, Reader};
use super::models::SessionRecord;
use super::tables::*;

pub fn get<R: Reader>(reader: &R, token: &str) -> Result<Option<SessionRecord>, DatabaseError> {
    get_record(reader, SESSIONS, token)
}

pub fn put(txn: &WriteTransaction, session: &SessionRecord) -> Result<(), DatabaseError> {
    put_record(txn, SESSIONS, &session.token, session)
}

pub fn remove(txn: &WriteTransaction, token: &str) -> Result<bool, DatabaseError> {
    remove_record(txn, SESSIONS, token)
}

impl Database {
    pub fn get_session(&self, token: &str) -> Result<Option<SessionRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        get(&read_txn, token)
    }

    pub fn put_session(&self, session: &SessionRecord) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        put(&write_txn, session)?;
        write_txn.commit()?;
        Ok(())
    }

    pub fn delete_session(&self, token: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let removed = remove(&write_txn, token)?;
        write_txn.commit()?;
        Ok(removed)
    }
}
