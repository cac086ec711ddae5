use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;
use crate::ports::ObjectStore;

/// Object store backed by a local directory, one file per key.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let target = self.root.join(key);
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::Write {
                path: self.root.clone(),
                source,
            })?;

        let content = tokio::fs::read(local_path)
            .await
            .map_err(|source| StoreError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;
        tokio::fs::write(&target, &content)
            .await
            .map_err(|source| StoreError::Write {
                path: target.clone(),
                source,
            })?;

        debug!(key, path = ?target, "Object stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copies_file_under_key() {
        let scratch = tempfile::tempdir().unwrap();
        let source = scratch.path().join("image_1.jpg");
        std::fs::write(&source, b"jpeg bytes").unwrap();

        let store = DirectoryStore::new(scratch.path().join("uploads"));
        store.put("image_1.jpg", &source).await.unwrap();

        let stored = std::fs::read(scratch.path().join("uploads/image_1.jpg")).unwrap();
        assert_eq!(stored, b"jpeg bytes");
        assert!(source.exists());
    }

    #[tokio::test]
    async fn missing_source_is_read_error() {
        let scratch = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(scratch.path());

        let result = store.put("gone.jpg", &scratch.path().join("gone.jpg")).await;
        assert!(matches!(result, Err(StoreError::Read { .. })));
    }
}
