//! # Asset Server
//!
//! A multi-tenant image asset server that renders variants on demand.
//!
//! Tenants upload original images; clients then request them by URL, either
//! unchanged or as a variant described by query parameters (size, fit mode,
//! grayscale, invert, blur, quality, output format). Each distinct variant is
//! rendered at most once, even under concurrent demand, and published to an
//! on-disk cache that later requests read directly.
//!
//! ## Features
//!
//! - **Canonical variant keys**: equivalent queries map to one cache file
//! - **Single-flight generation**: concurrent misses share one render
//! - **Bounded transforms**: CPU work runs on a fixed number of blocking workers
//! - **Atomic publication**: readers never observe a partially written file
//! - **Tenant directory**: uploads are authorized by SHA-256 secret digests
//!
//! ## Architecture
//!
//! - [`variant`] - Query normalization, cache keys, single-flight and rendering
//! - [`storage`] - Originals, cached variants and atomic publication
//! - [`directory`] - Tenant credential checks
//! - [`upload`] - Upload authorization and storage
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use asset_server::{
//!     create_router, ImageRenderer, OriginalStore, RouterConfig, StaticDirectory,
//!     UploadService, VariantService, VariantStore,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let variants = VariantService::new(
//!         OriginalStore::new("./uploads"),
//!         VariantStore::new("./uploads"),
//!         ImageRenderer::new(),
//!         4,
//!     );
//!     let directory = StaticDirectory::new().with_tenant("acme", "acme", "s3cret");
//!     let uploads = UploadService::new(
//!         OriginalStore::new("./uploads"),
//!         Arc::new(directory),
//!         "http://localhost:3001",
//!     );
//!
//!     let router = create_router(variants, uploads, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod server;
pub mod storage;
pub mod upload;
pub mod variant;

// Re-export commonly used types
pub use config::Config;
pub use directory::{secret_digest, DirectoryService, FileDirectory, StaticDirectory, TenantAccess};
pub use error::{DirectoryError, StorageError, UploadError, VariantError};
pub use server::{
    create_router, health_handler, upload_handler, variant_handler, AppState, ClientIp,
    ErrorResponse, HealthResponse, RouterConfig, UploadRejection, UploadResponse, X_VARIANT_CACHE,
};
pub use storage::{OriginalAsset, OriginalStore, VariantStore};
pub use upload::{UploadReceipt, UploadService, UploadedFile};
pub use variant::{
    CacheOutcome, FitMode, ImageRenderer, SingleFlight, TransformPool, VariantKey, VariantParams,
    VariantQuery, VariantRenderer, VariantResponse, VariantService,
};
