//! Published variant lookup.
//!
//! Variants live at `{root}/{tenant}/cache/{key file name}`. This store only
//! answers "is it there" and "give me the bytes"; files reach their final
//! name exclusively through [`publish`](super::publish).

use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::StorageError;
use crate::variant::VariantKey;

use super::publish;

/// Name of the per-tenant directory holding rendered variants.
pub const CACHE_DIR: &str = "cache";

/// Filesystem-backed store of published variants.
#[derive(Debug, Clone)]
pub struct VariantStore {
    root: PathBuf,
}

impl VariantStore {
    /// Create a store rooted at `root` (the same root as the originals).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `tenant`'s variants.
    pub fn cache_dir(&self, tenant: &str) -> PathBuf {
        self.root.join(tenant).join(CACHE_DIR)
    }

    /// Final path of the variant identified by `key`.
    pub fn path_for(&self, key: &VariantKey) -> PathBuf {
        self.cache_dir(key.tenant()).join(key.file_name())
    }

    /// Create the tenant's cache directory if needed.
    ///
    /// Idempotent: an existing directory is success.
    pub async fn ensure_cache_dir(&self, tenant: &str) -> Result<PathBuf, StorageError> {
        let dir = self.cache_dir(tenant);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::from_io(&dir, e))?;
        Ok(dir)
    }

    /// Whether a complete variant is published under `key`.
    pub async fn exists(&self, key: &VariantKey) -> bool {
        tokio::fs::metadata(self.path_for(key))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Read the published variant.
    pub async fn read(&self, key: &VariantKey) -> Result<Bytes, StorageError> {
        let path = self.path_for(key);
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| StorageError::from_io(&path, e))
    }

    /// Atomically publish `data` as the variant for `key`.
    pub async fn publish(&self, key: &VariantKey, data: &[u8]) -> Result<(), StorageError> {
        self.ensure_cache_dir(key.tenant()).await?;
        publish::publish(&self.path_for(key), data).await
    }
}
