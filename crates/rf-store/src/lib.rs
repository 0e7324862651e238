//! # rf-store
//!
//! Artifact storage for the recforge pipeline.
//!
//! Artifacts are byte blobs (videos, audio, transcripts, analysis results)
//! addressed by opaque string keys. Keys for stage outputs are derived from
//! (job, stage) only, never from the attempt number, so a retried attempt
//! finds the output of an earlier attempt that finished but was not recorded.
//!
//! - [`ArtifactStore`] -- the storage trait used by stage executors.
//! - [`FsArtifactStore`] -- keys mapped to files under a root directory.
//! - [`MemoryArtifactStore`] -- in-process map, used in tests.
//! - [`keys`] -- content-key helpers.

pub mod fs;
pub mod keys;
pub mod memory;

use std::path::Path;

use async_trait::async_trait;
use rf_core::{Error, Result};

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

/// Content-keyed blob storage.
///
/// Overwriting an existing key with the same content is allowed.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key` and return the key.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;

    /// Fetch the bytes stored under `key`.
    ///
    /// Fails with [`Error::NotFound`] when the key is absent.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Store the contents of a local file under `key`.
    async fn put_file(&self, key: &str, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        self.put(key, &bytes).await
    }

    /// Copy the artifact under `key` into a local file at `dest`.
    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<()> {
        let bytes = self.get(key).await?;
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }
}

/// Reject keys that are empty, absolute, or that escape their prefix.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Validation("artifact key is empty".into()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(Error::Validation(format!("invalid artifact key: {key}")));
    }
    if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(Error::Validation(format!("invalid artifact key: {key}")));
    }
    Ok(())
}
