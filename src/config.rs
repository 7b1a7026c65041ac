//! Configuration management for the asset server.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `ASSET_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `ASSET_HOST` - Server bind address (default: 0.0.0.0)
//! - `ASSET_PORT` - Server port (default: 3001)
//! - `ASSET_ROOT` - Storage root for originals and variants (default: ./uploads)
//! - `ASSET_BASE_URL` - Public URL prefix returned by uploads (default: http://localhost:3001)
//! - `ASSET_DIRECTORY_FILE` - JSON tenants file (required)
//! - `ASSET_TRANSFORM_WORKERS` - Concurrent renders (default: available parallelism)
//! - `ASSET_MAX_DIMENSION` - Largest accepted width/height (default: 8192)
//! - `ASSET_MAX_UPLOAD_BYTES` - Largest accepted request body (default: 25 MiB)
//! - `ASSET_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 31536000)
//! - `ASSET_CORS_ORIGINS` - Allowed CORS origins, comma separated (default: any)

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::server::{DEFAULT_CACHE_MAX_AGE, DEFAULT_MAX_UPLOAD_BYTES};
use crate::variant::DEFAULT_MAX_DIMENSION;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3001;

/// Default storage root.
pub const DEFAULT_ROOT: &str = "./uploads";

/// Default public URL prefix.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Asset Server - multi-tenant image uploads with on-demand variants.
///
/// Tenants upload originals; clients fetch resized, reformatted or recolored
/// variants by URL. Variants are rendered once and cached on disk.
#[derive(Parser, Debug, Clone)]
#[command(name = "asset-server")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "ASSET_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "ASSET_PORT")]
    pub port: u16,

    /// Public URL prefix used in upload responses.
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "ASSET_BASE_URL")]
    pub base_url: String,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Directory holding tenant folders (originals and their cache/).
    #[arg(long, default_value = DEFAULT_ROOT, env = "ASSET_ROOT")]
    pub root: PathBuf,

    /// JSON file listing tenants and their secret digests.
    #[arg(long, env = "ASSET_DIRECTORY_FILE")]
    pub directory_file: PathBuf,

    // =========================================================================
    // Transform Configuration
    // =========================================================================
    /// Maximum number of variants rendered concurrently.
    ///
    /// Defaults to the number of available CPUs.
    #[arg(long, env = "ASSET_TRANSFORM_WORKERS")]
    pub transform_workers: Option<usize>,

    /// Largest accepted width or height.
    #[arg(long, default_value_t = DEFAULT_MAX_DIMENSION, env = "ASSET_MAX_DIMENSION")]
    pub max_dimension: u32,

    /// Largest accepted request body in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "ASSET_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "ASSET_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "ASSET_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| format!("base_url '{}' is not a valid URL: {}", self.base_url, e))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(format!(
                "base_url must use http or https, got '{}'",
                base_url.scheme()
            ));
        }
        if base_url.query().is_some() || base_url.fragment().is_some() {
            return Err("base_url must not contain a query or fragment".to_string());
        }

        if self.root.as_os_str().is_empty() {
            return Err("Storage root is required. Set --root or ASSET_ROOT".to_string());
        }

        if self.directory_file.as_os_str().is_empty() {
            return Err(
                "Tenant directory file is required. Set --directory-file or ASSET_DIRECTORY_FILE"
                    .to_string(),
            );
        }

        if self.transform_workers == Some(0) {
            return Err("transform_workers must be greater than 0".to_string());
        }

        if self.max_dimension == 0 {
            return Err("max_dimension must be greater than 0".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Number of concurrent renders, defaulting to the CPU count.
    pub fn workers(&self) -> usize {
        self.transform_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
