use thiserror::Error;

use crate::content_store::ContentStoreError;
use crate::secrets::RandomError;
use crate::storage::DatabaseError;

/// Failure of a drive operation, as seen by the request boundary.
#[derive(Debug, Error)]
pub enum DriveError {
    /// Record absent, or owned by someone else.
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("folder is not empty ({files_count} files, {children_count} sub-folders)")]
    NotEmpty {
        files_count: usize,
        children_count: usize,
    },
    /// Metadata exists but the bytes are gone.
    #[error("blob missing: {0}")]
    BlobMissing(String),
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),
    #[error("share link expired")]
    Expired,
    #[error("share link download limit reached")]
    LimitExceeded,
    #[error("password required")]
    PasswordRequired,
    #[error("password incorrect")]
    PasswordIncorrect,
    #[error("not authorized")]
    Unauthorized,
    #[error("invalid input: {0}")]
    Validation(String),
    /// A bulk operation ran out of time; work already done is kept.
    #[error("operation interrupted: {0}")]
    Interrupted(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("content store error: {0}")]
    Content(ContentStoreError),
    #[error(transparent)]
    Random(#[from] RandomError),
}

impl From<ContentStoreError> for DriveError {
    fn from(e: ContentStoreError) -> Self {
        match e {
            ContentStoreError::NotFound(key) => DriveError::BlobMissing(key),
            other => DriveError::Content(other),
        }
    }
}

impl From<redb::CommitError> for DriveError {
    fn from(e: redb::CommitError) -> Self {
        DriveError::Database(e.into())
    }
}
