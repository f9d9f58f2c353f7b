mod local;

pub use local::LocalStore;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;

#[derive(Debug, Error)]
pub enum ContentStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),
}

/// Chunked body fed into [`ContentStore::put_stream`].
pub type ByteStream<'a> = BoxStream<'a, Result<Bytes, std::io::Error>>;

/// Readable handle over a stored blob.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Result of writing a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Key of the blob, `<owner_id>/<uuid>`.
    pub stored_id: String,
    /// Lowercase hex SHA-256 of the full content.
    pub hash: String,
    pub size: u64,
}

/// Physical blob storage shared by all accounts.
///
/// Every `put` produces a fresh key under the owner's namespace, so a blob is
/// owned by exactly one record and can be deleted without reference counting.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Write a blob from a chunk stream, hashing as it goes. If the stream
    /// yields an error, the partially written blob is removed.
    async fn put_stream(
        &self,
        owner_id: &str,
        data: ByteStream<'_>,
    ) -> Result<StoredBlob, ContentStoreError>;

    /// Open a blob for streaming, returning the reader and its size.
    async fn open(&self, stored_id: &str) -> Result<(BlobReader, u64), ContentStoreError>;

    /// Remove a blob. A missing blob is not an error.
    async fn delete(&self, stored_id: &str) -> Result<(), ContentStoreError>;

    async fn exists(&self, stored_id: &str) -> Result<bool, ContentStoreError>;

    async fn put(&self, owner_id: &str, data: Bytes) -> Result<StoredBlob, ContentStoreError> {
        self.put_stream(owner_id, stream::once(async move { Ok::<_, std::io::Error>(data) }).boxed())
            .await
    }

    async fn get(&self, stored_id: &str) -> Result<Bytes, ContentStoreError> {
        let (mut reader, size) = self.open(stored_id).await?;
        let mut buf = Vec::with_capacity(size as usize);
        reader.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Physically duplicate a blob into the owner's namespace.
    async fn copy(&self, stored_id: &str, owner_id: &str) -> Result<StoredBlob, ContentStoreError> {
        let (reader, _) = self.open(stored_id).await?;
        self.put_stream(owner_id, ReaderStream::new(reader).boxed())
            .await
    }
}

/// Incremental SHA-256 over blob chunks.
pub(crate) struct ContentHasher {
    ctx: ring::digest::Context,
    size: u64,
}

impl ContentHasher {
    pub(crate) fn new() -> Self {
        Self {
            ctx: ring::digest::Context::new(&ring::digest::SHA256),
            size: 0,
        }
    }

    pub(crate) fn update(&mut self, chunk: &[u8]) {
        self.ctx.update(chunk);
        self.size += chunk.len() as u64;
    }

    pub(crate) fn finish(self) -> (String, u64) {
        (hex::encode(self.ctx.finish().as_ref()), self.size)
    }
}

/// SHA-256 of an in-memory buffer, hex encoded.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(ring::digest::digest(&ring::digest::SHA256, data).as_ref())
}
