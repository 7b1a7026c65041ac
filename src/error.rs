use std::path::Path;

use thiserror::Error;

/// Errors from the on-disk original and variant stores.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// File or directory does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other filesystem failure
    #[error("I/O error at {path}: {message}")]
    Io { path: String, message: String },
}

impl StorageError {
    /// Wrap a `std::io::Error` raised while touching `path`.
    ///
    /// `NotFound` is kept distinct so callers can map it to a 404.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path.display().to_string())
        } else {
            StorageError::Io {
                path: path.display().to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Errors that can occur while serving or generating a variant.
///
/// The type is `Clone` because a single generation outcome is shared between
/// the leader and every request that joined it.
#[derive(Debug, Clone, Error)]
pub enum VariantError {
    /// A request parameter failed validation (maps to HTTP 400)
    #[error("Invalid parameter '{param}': {message}")]
    InvalidParameter { param: &'static str, message: String },

    /// No original matches the requested basename
    #[error("Original not found: {tenant}/{basename}")]
    OriginalNotFound { tenant: String, basename: String },

    /// More than one original shares the requested basename
    #[error("Ambiguous original {tenant}/{basename}: matches {candidates:?}")]
    AmbiguousOriginal {
        tenant: String,
        basename: String,
        candidates: Vec<String>,
    },

    /// The original could not be decoded
    #[error("Decode error: {message}")]
    DecodeError { message: String },

    /// The rendered image could not be encoded
    #[error("Encode error: {message}")]
    EncodeError { message: String },

    /// The generation task died before settling (panic, abort)
    #[error("Generation aborted: {message}")]
    GenerationAborted { message: String },

    /// Filesystem error in the original or variant store
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl VariantError {
    pub(crate) fn invalid(param: &'static str, message: impl Into<String>) -> Self {
        VariantError::InvalidParameter {
            param,
            message: message.into(),
        }
    }
}

/// Outcome of a tenant directory lookup that did not grant access.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// The tenant is not registered
    #[error("Unknown tenant: {tenant}")]
    UnknownTenant { tenant: String },

    /// The tenant exists but the secret does not match
    #[error("Secret mismatch for tenant {tenant}")]
    SecretMismatch { tenant: String },

    /// The directory backend could not be consulted
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while accepting an upload.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// The tenant segment of the path is not usable as a folder name
    #[error("Invalid tenant id: {0}")]
    InvalidTenant(String),

    /// The multipart body could not be parsed
    #[error("Malformed multipart body: {0}")]
    Multipart(String),

    /// A required form field was absent
    #[error("Expected field '{field}' in form-data")]
    MissingField { field: &'static str },

    /// The uploaded bytes are empty or not a recognised image
    #[error("Invalid file: {reason}")]
    InvalidFile { reason: String },

    /// No `userSecret` field was provided
    #[error("Missing tenant secret")]
    MissingSecret,

    /// Directory lookup refused or failed
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Writing the original failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
