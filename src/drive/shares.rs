use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{owned_file, Download, Drive, DriveError};
use crate::secrets::{hash_password, random_token, verify_password};
use crate::storage::models::{FileRecord, ShareRecord, UserShareRecord};
use crate::storage;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShare {
    pub password: Option<String>,
    /// Zero or negative means the link never expires.
    pub expires_in_days: Option<i64>,
    /// Zero means unlimited.
    pub max_downloads: Option<u32>,
}

/// A share link as shown to its owner. The password hash never leaves the
/// server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareView {
    pub id: String,
    pub file_id: String,
    pub token: String,
    pub has_password: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_downloads: Option<u32>,
    pub download_count: u32,
    pub created_at: DateTime<Utc>,
}

impl From<ShareRecord> for ShareView {
    fn from(share: ShareRecord) -> Self {
        Self {
            has_password: share.password_hash.is_some(),
            id: share.id,
            file_id: share.file_id,
            token: share.token,
            expires_at: share.expires_at,
            max_downloads: share.max_downloads,
            download_count: share.download_count,
            created_at: share.created_at,
        }
    }
}

/// A file someone else granted the caller access to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedFile {
    pub share_id: String,
    pub shared_by_user_id: String,
    pub shared_at: DateTime<Utc>,
    pub file: FileRecord,
}

/// Checks that do not depend on the supplied password, in resolve order.
fn check_usable(share: &ShareRecord, now: DateTime<Utc>) -> Result<(), DriveError> {
    if share.expires_at.is_some_and(|expires_at| now > expires_at) {
        return Err(DriveError::Expired);
    }
    if share
        .max_downloads
        .is_some_and(|max| share.download_count >= max)
    {
        return Err(DriveError::LimitExceeded);
    }
    Ok(())
}

impl Drive {
    // ========================================================================
    // Public links
    // ========================================================================

    pub fn create_share(
        &self,
        owner_id: &str,
        file_id: &str,
        options: NewShare,
    ) -> Result<ShareRecord, DriveError> {
        let now = Utc::now();
        let expires_at = match options.expires_in_days.filter(|days| *days > 0) {
            Some(days) => Some(
                TimeDelta::try_days(days)
                    .and_then(|delta| now.checked_add_signed(delta))
                    .ok_or_else(|| {
                        DriveError::Validation("expiresInDays is out of range".to_string())
                    })?,
            ),
            None => None,
        };
        let password_hash = options
            .password
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(hash_password)
            .transpose()?;

        let share = ShareRecord {
            id: Uuid::new_v4().to_string(),
            file_id: file_id.to_string(),
            token: random_token()?,
            password_hash,
            expires_at,
            max_downloads: options.max_downloads.filter(|max| *max > 0),
            download_count: 0,
            created_at: now,
        };

        let write_txn = self.db.begin_write()?;
        owned_file(&write_txn, owner_id, file_id)?;
        storage::shares::insert(&write_txn, &share)?;
        write_txn.commit()?;

        tracing::info!(file_id, share_id = %share.id, "Created share link");
        Ok(share)
    }

    pub fn list_shares(&self, owner_id: &str, file_id: &str) -> Result<Vec<ShareRecord>, DriveError> {
        let read_txn = self.db.begin_read()?;
        owned_file(&read_txn, owner_id, file_id)?;
        Ok(storage::shares::for_file(&read_txn, file_id)?)
    }

    /// Remove a share link. Only the owner of the shared file may do so.
    pub fn delete_share(&self, owner_id: &str, share_id: &str) -> Result<(), DriveError> {
        let write_txn = self.db.begin_write()?;
        let share = storage::shares::get(&write_txn, share_id)?.ok_or(DriveError::NotFound)?;
        let file_owner = storage::files::get(&write_txn, &share.file_id)?.map(|f| f.owner_id);
        if file_owner.as_deref() != Some(owner_id) {
            return Err(DriveError::Unauthorized);
        }
        storage::shares::remove(&write_txn, &share)?;
        write_txn.commit()?;

        tracing::info!(share_id, "Deleted share link");
        Ok(())
    }

    /// Resolve a public token to a download.
    ///
    /// Checks run in order: existence, expiry, download limit, password. The
    /// download counter is only incremented once the file is open, in the
    /// same transaction that re-checks the limit.
    pub async fn resolve_share(
        &self,
        token: &str,
        password: Option<&str>,
    ) -> Result<Download, DriveError> {
        let (share, file) = {
            let read_txn = self.db.begin_read()?;
            let share = storage::shares::by_token(&read_txn, token)?.ok_or(DriveError::NotFound)?;
            let file = storage::files::get(&read_txn, &share.file_id)?;
            (share, file)
        };
        check_usable(&share, Utc::now())?;

        if let Some(hash) = share.password_hash.clone() {
            let supplied = password
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .ok_or(DriveError::PasswordRequired)?
                .to_string();
            // PBKDF2 verification blocks for a while
            let matches = tokio::task::spawn_blocking(move || verify_password(&supplied, &hash))
                .await
                .unwrap_or(false);
            if !matches {
                tracing::debug!(share_id = %share.id, "Share password mismatch");
                return Err(DriveError::PasswordIncorrect);
            }
        }

        let file = file.ok_or(DriveError::NotFound)?;
        let download = self.open_blob(file).await?;

        let write_txn = self.db.begin_write()?;
        let mut current =
            storage::shares::by_token(&write_txn, token)?.ok_or(DriveError::NotFound)?;
        check_usable(&current, Utc::now())?;
        current.download_count += 1;
        storage::shares::update(&write_txn, &current)?;
        write_txn.commit()?;

        tracing::info!(
            share_id = %current.id,
            file_id = %download.file.id,
            download_count = current.download_count,
            "Resolved share link"
        );
        Ok(download)
    }

    // ========================================================================
    // Direct grants
    // ========================================================================

    pub fn share_with_user(
        &self,
        owner_id: &str,
        file_id: &str,
        user_id: &str,
    ) -> Result<UserShareRecord, DriveError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(DriveError::Validation("userId is required".to_string()));
        }
        if user_id == owner_id {
            return Err(DriveError::Validation(
                "cannot share a file with yourself".to_string(),
            ));
        }

        let write_txn = self.db.begin_write()?;
        owned_file(&write_txn, owner_id, file_id)?;
        if storage::user_shares::for_pair(&write_txn, file_id, user_id)?.is_some() {
            return Err(DriveError::Conflict(
                "file is already shared with this user".to_string(),
            ));
        }
        let grant = UserShareRecord {
            id: Uuid::new_v4().to_string(),
            file_id: file_id.to_string(),
            shared_with_user_id: user_id.to_string(),
            shared_by_user_id: owner_id.to_string(),
            created_at: Utc::now(),
        };
        storage::user_shares::insert(&write_txn, &grant)?;
        write_txn.commit()?;

        tracing::info!(file_id, grant_id = %grant.id, "Shared file with user");
        Ok(grant)
    }

    /// Grants on a file, for its owner.
    pub fn list_grants(&self, owner_id: &str, file_id: &str) -> Result<Vec<UserShareRecord>, DriveError> {
        let read_txn = self.db.begin_read()?;
        owned_file(&read_txn, owner_id, file_id)?;
        Ok(storage::user_shares::for_file(&read_txn, file_id)?)
    }

    /// Withdraw a grant. The file owner and the recipient may both do this.
    pub fn revoke_grant(
        &self,
        user_id: &str,
        file_id: &str,
        grant_id: &str,
    ) -> Result<(), DriveError> {
        let write_txn = self.db.begin_write()?;
        let grant = storage::user_shares::get(&write_txn, grant_id)?
            .filter(|g| g.file_id == file_id)
            .ok_or(DriveError::NotFound)?;
        let is_owner = storage::files::get(&write_txn, file_id)?
            .is_some_and(|f| f.owner_id == user_id);
        if !is_owner && grant.shared_with_user_id != user_id {
            return Err(DriveError::Unauthorized);
        }
        storage::user_shares::remove(&write_txn, &grant)?;
        write_txn.commit()?;

        tracing::info!(file_id, grant_id, "Revoked file grant");
        Ok(())
    }

    /// Files granted to `user_id`, newest grant first.
    pub fn shared_with_me(&self, user_id: &str) -> Result<Vec<SharedFile>, DriveError> {
        let read_txn = self.db.begin_read()?;
        let mut shared = Vec::new();
        for grant in storage::user_shares::shared_with(&read_txn, user_id)? {
            if let Some(file) = storage::files::get(&read_txn, &grant.file_id)? {
                shared.push(SharedFile {
                    share_id: grant.id,
                    shared_by_user_id: grant.shared_by_user_id,
                    shared_at: grant.created_at,
                    file,
                });
            }
        }
        Ok(shared)
    }

    /// Look up a grant on behalf of its recipient.
    pub fn grant_access(&self, user_id: &str, grant_id: &str) -> Result<SharedFile, DriveError> {
        let read_txn = self.db.begin_read()?;
        let grant = storage::user_shares::get(&read_txn, grant_id)?.ok_or(DriveError::NotFound)?;
        if grant.shared_with_user_id != user_id {
            return Err(DriveError::Unauthorized);
        }
        let file = storage::files::get(&read_txn, &grant.file_id)?.ok_or(DriveError::NotFound)?;
        Ok(SharedFile {
            share_id: grant.id,
            shared_by_user_id: grant.shared_by_user_id,
            shared_at: grant.created_at,
            file,
        })
    }

    /// Open a file through a direct grant. Owning the file is not enough.
    pub async fn resolve_for_user(&self, file_id: &str, user_id: &str) -> Result<Download, DriveError> {
        let file = {
            let read_txn = self.db.begin_read()?;
            let file = storage::files::get(&read_txn, file_id)?.ok_or(DriveError::NotFound)?;
            if storage::user_shares::for_pair(&read_txn, file_id, user_id)?.is_none() {
                return Err(DriveError::Unauthorized);
            }
            file
        };
        self.open_blob(file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(max_downloads: Option<u32>, download_count: u32, expires_at: Option<DateTime<Utc>>) -> ShareRecord {
        ShareRecord {
            id: "s".to_string(),
            file_id: "f".to_string(),
            token: "t".to_string(),
            password_hash: None,
            expires_at,
            max_downloads,
            download_count,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_check_usable_order() {
        let now = Utc::now();
        let past = now - TimeDelta::hours(1);

        assert!(check_usable(&share(None, 10, None), now).is_ok());
        assert!(matches!(
            check_usable(&share(Some(2), 2, None), now),
            Err(DriveError::LimitExceeded)
        ));
        // Expiry wins over the download limit
        assert!(matches!(
            check_usable(&share(Some(2), 2, Some(past)), now),
            Err(DriveError::Expired)
        ));
    }
}
