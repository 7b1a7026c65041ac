//! Tenant directory.
//!
//! Uploads are authorized by a shared secret per tenant. The directory maps a
//! tenant id and a presented secret to the folder the tenant's originals are
//! stored in, or refuses.
//!
//! Secrets are never held in clear text: records keep the SHA-256 digest of
//! the secret and a presented secret is hashed and compared in constant time.
//!
//! # Tenants file
//!
//! [`FileDirectory`] reads a JSON file at startup:
//!
//! ```json
//! {
//!   "tenants": [
//!     { "id": "acme", "storage_name": "acme", "secret_sha256": "9f86d0..." }
//!   ]
//! }
//! ```
//!
//! `storage_name` defaults to `id` when omitted.

mod file;

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::DirectoryError;

pub use file::FileDirectory;

/// What a successful validation grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantAccess {
    /// The tenant id that was validated
    pub tenant: String,

    /// Folder under the storage root that receives the tenant's uploads
    pub storage_name: String,
}

/// Resolves tenant credentials.
///
/// Called once per upload; implementations must not cache refusals on behalf
/// of callers.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Check `secret` for `tenant`.
    async fn validate(&self, tenant: &str, secret: &str) -> Result<TenantAccess, DirectoryError>;
}

/// SHA-256 digest of a secret.
pub fn secret_digest(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}

#[derive(Debug, Clone)]
struct TenantRecord {
    storage_name: String,
    secret_digest: [u8; 32],
}

/// In-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    tenants: HashMap<String, TenantRecord>,
}

impl StaticDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant with a clear-text secret.
    pub fn with_tenant(
        self,
        tenant: impl Into<String>,
        storage_name: impl Into<String>,
        secret: &str,
    ) -> Self {
        self.with_tenant_digest(tenant, storage_name, secret_digest(secret))
    }

    /// Register a tenant with the SHA-256 digest of its secret.
    pub fn with_tenant_digest(
        mut self,
        tenant: impl Into<String>,
        storage_name: impl Into<String>,
        secret_digest: [u8; 32],
    ) -> Self {
        self.tenants.insert(
            tenant.into(),
            TenantRecord {
                storage_name: storage_name.into(),
                secret_digest,
            },
        );
        self
    }

    /// Number of registered tenants.
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    /// Whether no tenant is registered.
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    fn check(&self, tenant: &str, secret: &str) -> Result<TenantAccess, DirectoryError> {
        let record = self
            .tenants
            .get(tenant)
            .ok_or_else(|| DirectoryError::UnknownTenant {
                tenant: tenant.to_string(),
            })?;

        let presented = secret_digest(secret);
        if bool::from(presented[..].ct_eq(&record.secret_digest[..])) {
            Ok(TenantAccess {
                tenant: tenant.to_string(),
                storage_name: record.storage_name.clone(),
            })
        } else {
            Err(DirectoryError::SecretMismatch {
                tenant: tenant.to_string(),
            })
        }
    }
}

#[async_trait]
impl DirectoryService for StaticDirectory {
    async fn validate(&self, tenant: &str, secret: &str) -> Result<TenantAccess, DirectoryError> {
        self.check(tenant, secret)
    }
}
