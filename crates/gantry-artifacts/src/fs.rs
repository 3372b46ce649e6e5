//! Filesystem-backed blob store for local runs.

use async_trait::async_trait;
use gantry_core::ports::BlobStore;
use gantry_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Stores blobs as files under a root directory. Keys are `/`-separated and
/// map to subdirectories; path traversal segments are rejected.
pub struct FilesystemStore {
    root_dir: PathBuf,
}

impl FilesystemStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root_dir.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(Error::BlobStorage(format!("invalid blob key: {}", key)));
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn relative_key(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root_dir)
            .ok()
            .map(|p| p.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/"))
    }

    fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::walk(&path, out)?;
            } else {
                out.push(path);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::BlobStorage(format!("Failed to create blob dir: {}", e)))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::BlobStorage(format!("Failed to write blob: {}", e)))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::BlobStorage(format!("Failed to read blob: {}", e))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::BlobStorage(format!("Failed to delete blob: {}", e))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.key_path(prefix)?;
        let keys = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            Self::walk(&dir, &mut files).map(|_| files)
        })
        .await
        .map_err(|e| Error::Internal(format!("List task failed: {}", e)))?
        .map_err(|e| Error::BlobStorage(format!("Failed to list blobs: {}", e)))?;

        Ok(keys
            .iter()
            .filter_map(|p| self.relative_key(p))
            .collect())
    }
}
