//! Session tokens. Sessions are issued by the login flow, which lives outside
//! this service; here they are only validated and expired.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use thiserror::Error;

use crate::secrets::{random_token, RandomError};
use crate::storage::models::SessionRecord;
use crate::storage::{sessions, Database, DatabaseError};

/// Lifetime of sessions minted by [`issue_session`].
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Activity is only written back when it is at least this stale.
const TOUCH_INTERVAL_SECS: i64 = 30;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown session")]
    UnknownSession,
    #[error("session expired")]
    Expired,
    #[error("session inactive for too long")]
    Inactive,
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Random(#[from] RandomError),
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::days(36_500))
}

/// Validate a session token.
///
/// Expired sessions and sessions idle for longer than `idle_timeout` are
/// deleted and rejected. A valid session has its last activity refreshed.
pub fn authenticate(
    db: &Database,
    token: &str,
    idle_timeout: Duration,
) -> Result<SessionRecord, AuthError> {
    let now = Utc::now();
    let write_txn = db.begin_write()?;
    let mut session = sessions::get(&write_txn, token)?.ok_or(AuthError::UnknownSession)?;

    let rejection = if now >= session.expires_at {
        Some(AuthError::Expired)
    } else if now - session.last_activity > to_delta(idle_timeout) {
        Some(AuthError::Inactive)
    } else {
        None
    };

    if let Some(rejection) = rejection {
        sessions::remove(&write_txn, token)?;
        write_txn.commit().map_err(DatabaseError::from)?;
        tracing::info!(user_id = %session.user_id, reason = %rejection, "Invalidated session");
        return Err(rejection);
    }

    if (now - session.last_activity).num_seconds() >= TOUCH_INTERVAL_SECS {
        session.last_activity = now;
        sessions::put(&write_txn, &session)?;
        write_txn.commit().map_err(DatabaseError::from)?;
    } else {
        write_txn.abort().map_err(DatabaseError::from)?;
    }
    Ok(session)
}

/// Create a session for `user_id`.
pub fn issue_session(db: &Database, user_id: &str, ttl: Duration) -> Result<SessionRecord, AuthError> {
    let now = Utc::now();
    let session = SessionRecord {
        token: random_token()?,
        user_id: user_id.to_string(),
        created_at: now,
        expires_at: now + to_delta(ttl),
        last_activity: now,
    };
    db.put_session(&session)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        (dir, db)
    }

    #[test]
    fn test_valid_session_authenticates() {
        let (_dir, db) = test_db();
        let session = issue_session(&db, "alice", SESSION_TTL).unwrap();

        let found = authenticate(&db, &session.token, Duration::from_secs(60)).unwrap();
        assert_eq!(found.user_id, "alice");
    }

    #[test]
    fn test_unknown_token_rejected() {
        let (_dir, db) = test_db();
        assert!(matches!(
            authenticate(&db, "nope", Duration::from_secs(60)),
            Err(AuthError::UnknownSession)
        ));
    }

    #[test]
    fn test_idle_session_is_invalidated() {
        let (_dir, db) = test_db();
        let mut session = issue_session(&db, "alice", SESSION_TTL).unwrap();
        session.last_activity = Utc::now() - TimeDelta::minutes(20);
        db.put_session(&session).unwrap();

        assert!(matches!(
            authenticate(&db, &session.token, Duration::from_secs(600)),
            Err(AuthError::Inactive)
        ));
        assert!(db.get_session(&session.token).unwrap().is_none());
    }

    #[test]
    fn test_expired_session_is_invalidated() {
        let (_dir, db) = test_db();
        let mut session = issue_session(&db, "alice", SESSION_TTL).unwrap();
        session.expires_at = Utc::now() - TimeDelta::seconds(1);
        db.put_session(&session).unwrap();

        assert!(matches!(
            authenticate(&db, &session.token, Duration::from_secs(600)),
            Err(AuthError::Expired)
        ));
        assert!(db.get_session(&session.token).unwrap().is_none());
    }
}
