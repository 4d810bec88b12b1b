//! Local filesystem backup store.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncRead;

use crate::error::StoreError;
use crate::traits::{ArtifactStat, BackupStore};

/// Artifacts on the local filesystem. Relative paths resolve against the
/// configured backup directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalStore { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl BackupStore for LocalStore {
    async fn stat(&self, path: &Path) -> Result<Option<ArtifactStat>, StoreError> {
        match fs::metadata(self.resolve(path)).await {
            Ok(meta) if meta.is_file() => Ok(Some(ArtifactStat {
                size_bytes: meta.len(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn open(
        &self,
        path: &Path,
    ) -> Result<Pin<Box<dyn AsyncRead + Send>>, StoreError> {
        match fs::File::open(self.resolve(path)).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(self.resolve(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn stat_open_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        std::fs::write(dir.path().join("a.dump"), b"PGDMP rest").unwrap();

        let stat = store.stat(Path::new("a.dump")).await.unwrap().unwrap();
        assert_eq!(stat.size_bytes, 10);

        let mut reader = store.open(Path::new("a.dump")).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"PGDMP rest");

        store.delete(Path::new("a.dump")).await.unwrap();
        assert!(store.stat(Path::new("a.dump")).await.unwrap().is_none());
        assert!(matches!(
            store.delete(Path::new("a.dump")).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn missing_artifact_stats_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.stat(Path::new("nope.dump")).await.unwrap().is_none());
    }
}
