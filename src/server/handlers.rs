//! HTTP request handlers for the asset API.
//!
//! # Endpoints
//!
//! - `GET /{tenant}/{basename}.{ext}` - Serve an original or a variant
//! - `POST /{tenant}/upload` - Upload an original (multipart)
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection, rejection::QueryRejection, Multipart, Path, Query, State,
    },
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{DirectoryError, StorageError, UploadError, VariantError};
use crate::upload::{UploadService, UploadedFile, IMAGE_FIELD, SECRET_FIELD};
use crate::variant::{ImageRenderer, VariantQuery, VariantRenderer, VariantService};

use super::client_ip::ClientIp;
use super::routes::DEFAULT_CACHE_MAX_AGE;

/// Diagnostic header reporting how a GET was served.
pub const X_VARIANT_CACHE: &str = "x-variant-cache";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<R: VariantRenderer = ImageRenderer> {
    /// Serves originals and variants
    pub variant_service: Arc<VariantService<R>>,

    /// Accepts uploads
    pub upload_service: Arc<UploadService>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,
}

impl<R: VariantRenderer> AppState<R> {
    /// Create application state with a one-year cache lifetime.
    pub fn new(variant_service: VariantService<R>, upload_service: UploadService) -> Self {
        Self {
            variant_service: Arc::new(variant_service),
            upload_service: Arc::new(upload_service),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
        }
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }
}

impl<R: VariantRenderer> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            variant_service: Arc::clone(&self.variant_service),
            upload_service: Arc::clone(&self.upload_service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_parameter")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Successful upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// URL the original (and its variants) can be fetched from
    pub url: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Log an error response by severity and render it as JSON.
fn error_response(status: StatusCode, error_type: &'static str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else if status.is_client_error() {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

/// Convert VariantError to HTTP response.
impl IntoResponse for VariantError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            VariantError::InvalidParameter { .. } => (StatusCode::BAD_REQUEST, "invalid_parameter"),
            VariantError::OriginalNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            VariantError::AmbiguousOriginal { .. } => (StatusCode::CONFLICT, "ambiguous_original"),
            VariantError::DecodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "decode_error"),
            VariantError::EncodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
            VariantError::GenerationAborted { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "generation_failed")
            }
            VariantError::Storage(StorageError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            VariantError::Storage(StorageError::Io { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
        };

        error_response(status, error_type, self.to_string())
    }
}

/// An upload error together with who caused it.
///
/// Refused credentials are logged with the requester's address.
pub struct UploadRejection {
    /// What went wrong
    pub error: UploadError,

    /// Tenant segment of the request path
    pub tenant: String,

    /// Requester address
    pub client_ip: ClientIp,
}

impl IntoResponse for UploadRejection {
    fn into_response(self) -> Response {
        let forbidden = |reason: &str| {
            warn!(
                tenant = %self.tenant,
                client_ip = %self.client_ip,
                status = StatusCode::FORBIDDEN.as_u16(),
                "Upload refused: {}",
                reason
            );
            let body = ErrorResponse::with_status(
                "forbidden",
                "Invalid credentials",
                StatusCode::FORBIDDEN,
            );
            (StatusCode::FORBIDDEN, Json(body)).into_response()
        };

        match &self.error {
            UploadError::MissingSecret => forbidden("missing secret"),
            UploadError::Directory(DirectoryError::UnknownTenant { .. }) => {
                forbidden("unknown tenant")
            }
            UploadError::Directory(DirectoryError::SecretMismatch { .. }) => {
                forbidden("secret mismatch")
            }
            UploadError::Directory(DirectoryError::Unavailable(_)) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "directory_unavailable",
                self.error.to_string(),
            ),
            UploadError::InvalidTenant(_) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_tenant", self.error.to_string())
            }
            UploadError::Multipart(_) => error_response(
                StatusCode::BAD_REQUEST,
                "invalid_multipart",
                self.error.to_string(),
            ),
            UploadError::MissingField { .. } => {
                error_response(StatusCode::BAD_REQUEST, "missing_field", self.error.to_string())
            }
            UploadError::InvalidFile { .. } => {
                error_response(StatusCode::BAD_REQUEST, "invalid_file", self.error.to_string())
            }
            UploadError::Storage(_) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                self.error.to_string(),
            ),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle original and variant requests.
///
/// # Endpoint
///
/// `GET /{tenant}/{basename}.{ext}`
///
/// # Query Parameters
///
/// - `w`, `h`: Target box (one alone means a square)
/// - `f`: Fit mode, one of cover/contain/fill/inside/outside (default inside)
/// - `grey`: Grayscale amount, 0 = off
/// - `invert`: `1` to invert colors
/// - `q`: Output quality 1-100 (default 80)
/// - `blur`: Gaussian blur radius, at most 1000
///
/// # Response
///
/// - `200 OK`: Image bytes
/// - `400 Bad Request`: Invalid parameter
/// - `404 Not Found`: No such original
/// - `409 Conflict`: Several originals share the basename
/// - `500 Internal Server Error`: Processing error
///
/// # Headers
///
/// - `Content-Type`: derived from the extension
/// - `Cache-Control: public, max-age={cache_max_age}, immutable`
/// - `X-Variant-Cache: hit|miss|joined|passthrough`
pub async fn variant_handler<R: VariantRenderer>(
    State(state): State<AppState<R>>,
    Path((tenant, filename)): Path<(String, String)>,
    query: Result<Query<VariantQuery>, QueryRejection>,
) -> Result<Response, VariantError> {
    let Query(query) = query.map_err(|e| VariantError::invalid("query", e.body_text()))?;
    let response = state
        .variant_service
        .fetch(&tenant, &filename, &query)
        .await?;

    let content_type = HeaderValue::from_str(&response.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    let cache_control =
        HeaderValue::from_str(&format!("public, max-age={}, immutable", state.cache_max_age))
            .unwrap_or(HeaderValue::from_static("public, immutable"));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, cache_control),
            (
                HeaderName::from_static(X_VARIANT_CACHE),
                HeaderValue::from_static(response.outcome.as_str()),
            ),
        ],
        Body::from(response.data),
    )
        .into_response())
}

/// Handle upload requests.
///
/// # Endpoint
///
/// `POST /{tenant}/upload`
///
/// # Form Fields
///
/// - `image`: The image file
/// - `userSecret`: Tenant secret
///
/// # Response
///
/// - `200 OK`: `{"url": "<base>/{tenant}/{basename}"}`
/// - `400 Bad Request`: Malformed body, missing or invalid image
/// - `403 Forbidden`: Missing or refused secret
/// - `500 Internal Server Error`: Directory or storage failure
pub async fn upload_handler<R: VariantRenderer>(
    State(state): State<AppState<R>>,
    Path(tenant): Path<String>,
    client_ip: ClientIp,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, UploadRejection> {
    let result = async {
        let multipart = multipart.map_err(|e| UploadError::Multipart(e.body_text()))?;
        let (secret, file) = read_upload_form(multipart).await?;
        state
            .upload_service
            .upload(&tenant, secret.as_deref(), file)
            .await
    }
    .await;

    match result {
        Ok(receipt) => Ok(Json(UploadResponse { url: receipt.url })),
        Err(error) => Err(UploadRejection {
            error,
            tenant,
            client_ip,
        }),
    }
}

/// Collect the secret and image fields; other fields are ignored.
async fn read_upload_form(
    mut multipart: Multipart,
) -> Result<(Option<String>, Option<UploadedFile>), UploadError> {
    let mut secret = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart(e.body_text()))?
    {
        match field.name() {
            Some(IMAGE_FIELD) => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data: Bytes = field
                    .bytes()
                    .await
                    .map_err(|e| UploadError::Multipart(e.body_text()))?;
                file = Some(UploadedFile { file_name, data });
            }
            Some(SECRET_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| UploadError::Multipart(e.body_text()))?;
                secret = Some(text);
            }
            _ => {}
        }
    }

    Ok((secret, file))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
