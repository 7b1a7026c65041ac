//! Upload of originals.
//!
//! An upload is checked in a fixed order, cheapest first, and the directory
//! is consulted only once the request is otherwise well formed:
//!
//! 1. tenant id usable as a path segment   (400)
//! 2. secret present                       (403)
//! 3. file present, non-empty, an image    (400)
//! 4. directory grants the secret          (403, or 500 if unavailable)
//! 5. original published atomically       (500 on storage failure)

use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use crate::directory::DirectoryService;
use crate::error::UploadError;
use crate::storage::{OriginalAsset, OriginalStore};
use crate::variant::validate_segment;

/// Name of the multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// Name of the multipart field carrying the tenant secret.
pub const SECRET_FIELD: &str = "userSecret";

/// A file received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied filename (may be empty)
    pub file_name: String,

    /// File contents
    pub data: Bytes,
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// Public URL of the original, without extension
    pub url: String,

    /// Where the original was stored
    pub asset: OriginalAsset,
}

/// Authorizes and stores uploaded originals.
pub struct UploadService {
    originals: OriginalStore,
    directory: Arc<dyn DirectoryService>,
    base_url: String,
}

impl UploadService {
    /// Create an upload service.
    ///
    /// `base_url` prefixes the URLs handed back to clients; a trailing slash
    /// is ignored.
    pub fn new(
        originals: OriginalStore,
        directory: Arc<dyn DirectoryService>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            originals,
            directory,
            base_url,
        }
    }

    /// The URL prefix returned to clients.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authorize and store an upload for `tenant`.
    pub async fn upload(
        &self,
        tenant: &str,
        secret: Option<&str>,
        file: Option<UploadedFile>,
    ) -> Result<UploadReceipt, UploadError> {
        validate_segment("tenant", tenant).map_err(|e| UploadError::InvalidTenant(e.to_string()))?;

        let secret = secret
            .filter(|s| !s.is_empty())
            .ok_or(UploadError::MissingSecret)?;

        let file = file.ok_or(UploadError::MissingField { field: IMAGE_FIELD })?;
        check_image(&file.data)?;

        let access = self.directory.validate(tenant, secret).await?;

        let asset = self
            .originals
            .save(&access.storage_name, &file.file_name, &file.data)
            .await?;

        let url = format!("{}/{}/{}", self.base_url, tenant, asset.basename);
        info!(
            tenant = %tenant,
            storage = %access.storage_name,
            basename = %asset.basename,
            bytes = file.data.len(),
            "Stored original"
        );

        Ok(UploadReceipt { url, asset })
    }
}

/// Reject empty payloads and bytes no decoder recognises.
fn check_image(data: &[u8]) -> Result<(), UploadError> {
    if data.is_empty() {
        return Err(UploadError::InvalidFile {
            reason: "file is empty".to_string(),
        });
    }
    image::guess_format(data)
        .map(|_| ())
        .map_err(|_| UploadError::InvalidFile {
            reason: "not a recognised image format".to_string(),
        })
}
