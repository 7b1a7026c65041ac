//! Uploaded originals.
//!
//! Originals are stored flat in the tenant directory as
//! `{stem}-{uploadMillis}.{ext}` and looked up by everything before the
//! extension, so clients never need to know what format was uploaded.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::error::{StorageError, VariantError};
use crate::variant::split_filename;

use super::publish;

/// Extension given to uploads whose filename has none.
pub const DEFAULT_UPLOAD_EXTENSION: &str = "png";

/// Stem given to uploads whose filename sanitizes to nothing.
const DEFAULT_UPLOAD_STEM: &str = "image";

/// Last timestamp handed out, so two uploads in the same millisecond differ.
static LAST_UPLOAD_MILLIS: AtomicU64 = AtomicU64::new(0);

/// A stored original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalAsset {
    /// Tenant folder the original lives in
    pub tenant: String,

    /// Stored filename without extension (what clients request)
    pub basename: String,

    /// Stored extension, without the dot
    pub extension: String,

    /// Full path on disk
    pub path: PathBuf,
}

impl OriginalAsset {
    /// Read the original's bytes.
    pub async fn read(&self) -> Result<Bytes, StorageError> {
        tokio::fs::read(&self.path)
            .await
            .map(Bytes::from)
            .map_err(|e| StorageError::from_io(&self.path, e))
    }
}

/// Filesystem-backed store of uploaded originals.
#[derive(Debug, Clone)]
pub struct OriginalStore {
    root: PathBuf,
}

impl OriginalStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `tenant`'s originals.
    pub fn tenant_dir(&self, tenant: &str) -> PathBuf {
        self.root.join(tenant)
    }

    /// Find the original whose stored name, minus extension, is `basename`.
    ///
    /// Hidden files (in-progress uploads) and directories are ignored. When
    /// more than one file matches, the lookup fails with
    /// [`VariantError::AmbiguousOriginal`] instead of picking one.
    pub async fn resolve(&self, tenant: &str, basename: &str) -> Result<OriginalAsset, VariantError> {
        let dir = self.tenant_dir(tenant);
        let not_found = || VariantError::OriginalNotFound {
            tenant: tenant.to_string(),
            basename: basename.to_string(),
        };

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(StorageError::from_io(&dir, e).into()),
        };

        let mut matches: Vec<(String, String)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(&dir, e))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let (stem, ext) = split_filename(&name);
            if stem != basename {
                continue;
            }
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                let ext = ext.unwrap_or_default().to_string();
                matches.push((name, ext));
            }
        }

        match matches.len() {
            0 => Err(not_found()),
            1 => {
                let (name, extension) = matches.remove(0);
                Ok(OriginalAsset {
                    tenant: tenant.to_string(),
                    basename: basename.to_string(),
                    extension,
                    path: dir.join(name),
                })
            }
            _ => {
                let mut candidates: Vec<String> = matches.into_iter().map(|(name, _)| name).collect();
                candidates.sort();
                Err(VariantError::AmbiguousOriginal {
                    tenant: tenant.to_string(),
                    basename: basename.to_string(),
                    candidates,
                })
            }
        }
    }

    /// Store an uploaded original for `tenant_folder`.
    ///
    /// `upload_name` is the client-supplied filename; its stem is sanitized and
    /// suffixed with the upload time in milliseconds.
    pub async fn save(
        &self,
        tenant_folder: &str,
        upload_name: &str,
        data: &[u8],
    ) -> Result<OriginalAsset, StorageError> {
        let dir = self.tenant_dir(tenant_folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::from_io(&dir, e))?;

        let (stem, extension) = upload_stem_and_extension(upload_name);
        let basename = format!("{}-{}", stem, next_upload_millis());
        let path = dir.join(format!("{}.{}", basename, extension));

        publish::publish(&path, data).await?;

        Ok(OriginalAsset {
            tenant: tenant_folder.to_string(),
            basename,
            extension,
            path,
        })
    }
}

/// Split a client filename into a path-safe stem and extension.
///
/// Directory components are dropped, stem characters outside
/// `[A-Za-z0-9_-]` become `_`, and non-alphanumeric extension characters are
/// removed.
pub fn upload_stem_and_extension(upload_name: &str) -> (String, String) {
    let file_name = upload_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(upload_name);
    let (stem, ext) = split_filename(file_name);

    let stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = if stem.is_empty() {
        DEFAULT_UPLOAD_STEM.to_string()
    } else {
        stem
    };

    let ext: String = ext
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    let ext = if ext.is_empty() {
        DEFAULT_UPLOAD_EXTENSION.to_string()
    } else {
        ext
    };

    (stem, ext)
}

/// Current time in milliseconds, strictly increasing within the process.
fn next_upload_millis() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let previous = LAST_UPLOAD_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}
