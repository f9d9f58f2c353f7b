use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};

use super::db::{put_record, Database, DatabaseError, Reader};
use super::models::SyncEventRecord;
use super::tables::*;

pub fn append(txn: &WriteTransaction, event: &SyncEventRecord) -> Result<(), DatabaseError> {
    let key = event_key(
        &event.owner_id,
        event.created_at.timestamp_micros(),
        &event.id,
    );
    put_record(txn, SYNC_EVENTS, &key, event)
}

/// Events of an owner created strictly after `since`, oldest first.
///
/// Stops after `limit` events, except that events sharing the last returned
/// microsecond are all included so a caller resuming from that timestamp
/// misses none of them.
pub fn since<R: Reader>(
    reader: &R,
    owner_id: &str,
    since: Option<DateTime<Utc>>,
    limit: usize,
) -> Result<Vec<SyncEventRecord>, DatabaseError> {
    let prefix = event_prefix(owner_id);
    let start = match since {
        Some(ts) => event_key(owner_id, ts.timestamp_micros() + 1, ""),
        None => prefix.clone(),
    };

    let table = reader.table(SYNC_EVENTS)?;
    let mut events: Vec<SyncEventRecord> = Vec::new();
    for result in table.range(start.as_str()..)? {
        let (key, value) = result?;
        if !key.value().starts_with(&prefix) {
            break;
        }
        let event: SyncEventRecord = rmp_serde::from_slice(value.value())?;
        if events.len() >= limit {
            let tied = events.last().is_some_and(|last| {
                last.created_at.timestamp_micros() == event.created_at.timestamp_micros()
            });
            if !tied {
                break;
            }
        }
        events.push(event);
    }
    Ok(events)
}

impl Database {
    pub fn append_sync_event(&self, event: &SyncEventRecord) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        append(&write_txn, event)?;
        write_txn.commit()?;
        Ok(())
    }

    pub fn sync_events_since(
        &self,
        owner_id: &str,
        since_ts: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<SyncEventRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        since(&read_txn, owner_id, since_ts, limit)
    }
}
