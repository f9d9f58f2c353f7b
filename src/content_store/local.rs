use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{BlobReader, ByteStream, ContentHasher, ContentStore, ContentStoreError, StoredBlob};

/// Local filesystem content store. Blobs live at `<base>/<owner_id>/<uuid>`.
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn blob_path(&self, stored_id: &str) -> Result<PathBuf, ContentStoreError> {
        let relative = Path::new(stored_id);
        let well_formed = !stored_id.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(ContentStoreError::InvalidKey(stored_id.to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    async fn write_blob(
        &self,
        path: &Path,
        mut data: ByteStream<'_>,
    ) -> Result<(String, u64), ContentStoreError> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut hasher = ContentHasher::new();

        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(hasher.finish())
    }
}

/// A blob file that is deleted on drop unless [`PartialBlob::keep`] is called.
struct PartialBlob {
    path: PathBuf,
    armed: bool,
}

impl PartialBlob {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialBlob {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed partial blob");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove partial blob");
            }
        }
    }
}

#[async_trait]
impl ContentStore for LocalStore {
    async fn put_stream(
        &self,
        owner_id: &str,
        data: ByteStream<'_>,
    ) -> Result<StoredBlob, ContentStoreError> {
        let stored_id = format!("{owner_id}/{}", uuid::Uuid::new_v4());
        let path = self.blob_path(&stored_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Removes the file on error and when the upload future is dropped
        let partial = PartialBlob::new(path.clone());
        let (hash, size) = self.write_blob(&path, data).await?;
        partial.keep();

        Ok(StoredBlob {
            stored_id,
            hash,
            size,
        })
    }

    async fn open(&self, stored_id: &str) -> Result<(BlobReader, u64), ContentStoreError> {
        let path = self.blob_path(stored_id)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ContentStoreError::NotFound(stored_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();
        Ok((Box::pin(file), size))
    }

    async fn delete(&self, stored_id: &str) -> Result<(), ContentStoreError> {
        let path = self.blob_path(stored_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, stored_id: &str) -> Result<bool, ContentStoreError> {
        let path = self.blob_path(stored_id)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
