//! Filesystem-backed artifact store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rf_core::{Error, Result};

use crate::{validate_key, ArtifactStore};

/// Stores each key as a file under `root`.
///
/// Writes go to a sibling temporary file first and are renamed into place,
/// so a reader never observes a partially written artifact.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a validated key to its on-disk path.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn staging_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.partial", uuid::Uuid::new_v4().simple()));
        path.with_file_name(name)
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("create {}: {e}", parent.display())))?;
        }
        Ok(())
    }

    async fn commit(staging: &Path, path: &Path) -> Result<()> {
        if let Err(e) = tokio::fs::rename(staging, path).await {
            let _ = tokio::fs::remove_file(staging).await;
            return Err(Error::Storage(format!("rename into {}: {e}", path.display())));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.path_for(key)?;
        Self::ensure_parent(&path).await?;

        let staging = Self::staging_path(&path);
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|e| Error::Storage(format!("write {}: {e}", staging.display())))?;
        Self::commit(&staging, &path).await?;

        tracing::debug!(key, bytes = bytes.len(), "stored artifact");
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("artifact", key))
            }
            Err(e) => Err(Error::Storage(format!("read {}: {e}", path.display()))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::Storage(format!("stat {}: {e}", path.display())))
    }

    async fn put_file(&self, key: &str, source: &Path) -> Result<String> {
        let path = self.path_for(key)?;
        Self::ensure_parent(&path).await?;

        let staging = Self::staging_path(&path);
        tokio::fs::copy(source, &staging)
            .await
            .map_err(|e| Error::Storage(format!("copy {}: {e}", source.display())))?;
        Self::commit(&staging, &path).await?;

        tracing::debug!(key, source = %source.display(), "stored artifact from file");
        Ok(key.to_string())
    }

    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::copy(&path, dest).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !path.exists() => {
                Err(Error::not_found("artifact", key))
            }
            Err(e) => Err(Error::Storage(format!("copy {}: {e}", path.display()))),
        }
    }
}
