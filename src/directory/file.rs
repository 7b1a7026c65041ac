//! JSON-file backed tenant directory.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::error::DirectoryError;
use crate::variant::validate_segment;

use super::{DirectoryService, StaticDirectory, TenantAccess};

#[derive(Debug, Deserialize)]
struct TenantsFile {
    tenants: Vec<TenantEntry>,
}

#[derive(Debug, Deserialize)]
struct TenantEntry {
    id: String,
    #[serde(default)]
    storage_name: Option<String>,
    secret_sha256: String,
}

/// Tenant directory loaded once from a JSON file.
#[derive(Debug, Clone)]
pub struct FileDirectory {
    inner: StaticDirectory,
}

impl FileDirectory {
    /// Read and parse the tenants file at `path`.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DirectoryError::Unavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        let directory = Self::from_json(&contents)?;
        info!(path = %path.display(), tenants = directory.len(), "Loaded tenant directory");
        Ok(directory)
    }

    /// Parse a tenants document.
    ///
    /// Every tenant id and storage name must be usable as a single path
    /// segment, and every digest must be 64 hex characters.
    pub fn from_json(contents: &str) -> Result<Self, DirectoryError> {
        let file: TenantsFile = serde_json::from_str(contents)
            .map_err(|e| DirectoryError::Unavailable(format!("invalid tenants file: {}", e)))?;

        let mut inner = StaticDirectory::new();
        for entry in file.tenants {
            let storage_name = entry.storage_name.unwrap_or_else(|| entry.id.clone());
            validate_segment("id", &entry.id)
                .and_then(|_| validate_segment("storage_name", &storage_name))
                .map_err(|e| {
                    DirectoryError::Unavailable(format!("tenant '{}': {}", entry.id, e))
                })?;

            let digest = hex::decode(entry.secret_sha256.trim())
                .ok()
                .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
                .ok_or_else(|| {
                    DirectoryError::Unavailable(format!(
                        "tenant '{}': secret_sha256 must be 64 hex characters",
                        entry.id
                    ))
                })?;

            inner = inner.with_tenant_digest(entry.id, storage_name, digest);
        }

        Ok(Self { inner })
    }

    /// Number of tenants loaded.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the file listed no tenants.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl DirectoryService for FileDirectory {
    async fn validate(&self, tenant: &str, secret: &str) -> Result<TenantAccess, DirectoryError> {
        self.inner.validate(tenant, secret).await
    }
}
