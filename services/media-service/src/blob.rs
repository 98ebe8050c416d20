//! Filesystem [`BlobStore`].
//!
//! Blobs are written under a root directory with a generated name
//! (`<uuid>` plus the sanitized extension of the uploaded file) and exposed
//! at `<public_base_url>/<blob_id>`.

use async_trait::async_trait;
use chirp_core::store::{BlobError, BlobStore, StoredBlob};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 10;

/// Blob store backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    /// Create a store writing under `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Unavailable`] if the directory cannot be created.
    pub async fn open(
        root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Result<Self, BlobError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| BlobError::Unavailable(format!("creating {}: {e}", root.display())))?;
        Ok(Self {
            root,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn path_for(&self, blob_id: &str) -> Result<PathBuf, BlobError> {
        let valid = !blob_id.is_empty()
            && blob_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !blob_id.starts_with('.');
        if valid {
            Ok(self.root.join(blob_id))
        } else {
            Err(BlobError::Rejected(format!("invalid blob id {blob_id:?}")))
        }
    }
}

fn extension_of(original_name: &str) -> Option<String> {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase)
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(
        &self,
        original_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredBlob, BlobError> {
        if original_name.trim().is_empty() {
            return Err(BlobError::Rejected("file name is empty".to_string()));
        }

        let blob_id = match extension_of(original_name) {
            Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
            None => Uuid::new_v4().to_string(),
        };
        let path = self.path_for(&blob_id)?;
        let size = bytes.len();
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| BlobError::Unavailable(format!("writing {}: {e}", path.display())))?;

        debug!(%blob_id, content_type, size, "Blob stored");
        Ok(StoredBlob {
            url: format!("{}/{blob_id}", self.public_base_url),
            blob_id,
        })
    }

    async fn delete(&self, blob_id: &str) -> Result<(), BlobError> {
        let path = self.path_for(blob_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%blob_id, "Blob already gone");
                Ok(())
            }
            Err(e) => Err(BlobError::Unavailable(format!(
                "removing {}: {e}",
                path.display()
            ))),
        }
    }
}
