//! HTTP server layer for the asset server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   GET /{tenant}/{file}        POST /{tenant}/upload             │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │  client_ip  │  │        routes           │  │
//! │  │ (requests)  │  │ (audit log) │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod client_ip;
pub mod handlers;
pub mod routes;

pub use client_ip::ClientIp;
pub use handlers::{
    health_handler, upload_handler, variant_handler, AppState, ErrorResponse, HealthResponse,
    UploadRejection, UploadResponse, X_VARIANT_CACHE,
};
pub use routes::{create_router, RouterConfig, DEFAULT_CACHE_MAX_AGE, DEFAULT_MAX_UPLOAD_BYTES};
