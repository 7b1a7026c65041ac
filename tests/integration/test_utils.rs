//! Test utilities for integration tests.
//!
//! This module provides instrumented renderers, image fixtures and helpers
//! for building a router over a temporary storage root.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use asset_server::{
    create_router, ImageRenderer, OriginalStore, RouterConfig, StaticDirectory, UploadService,
    VariantError, VariantParams, VariantRenderer, VariantService, VariantStore,
};

/// Tenant registered in every test directory.
pub const TENANT: &str = "acme";

/// Secret of [`TENANT`].
pub const SECRET: &str = "correct horse battery staple";

// =============================================================================
// Instrumented Renderer
// =============================================================================

/// A renderer that delegates to [`ImageRenderer`] while counting calls.
///
/// It can be slowed down to widen the window for concurrent requests, and
/// switched into a failing mode.
#[derive(Clone)]
pub struct CountingRenderer {
    inner: Arc<ImageRenderer>,
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    delay: Duration,
}

impl CountingRenderer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ImageRenderer::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl VariantRenderer for CountingRenderer {
    fn render(&self, source: &[u8], params: &VariantParams) -> Result<Bytes, VariantError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(VariantError::EncodeError {
                message: "renderer switched off".to_string(),
            });
        }
        self.inner.render(source, params)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Encode a `width` x `height` RGB gradient as PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// A storage root on disk plus a router serving it.
pub struct TestServer {
    pub dir: TempDir,
    pub renderer: CountingRenderer,
    pub router: Router,
}

impl TestServer {
    /// Build a server with a plain counting renderer.
    pub fn new() -> Self {
        Self::with_renderer(CountingRenderer::new())
    }

    /// Build a server around `renderer`.
    pub fn with_renderer(renderer: CountingRenderer) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(TENANT)).unwrap();

        let variant_service = VariantService::new(
            OriginalStore::new(dir.path()),
            VariantStore::new(dir.path()),
            renderer.clone(),
            2,
        );
        let directory = StaticDirectory::new().with_tenant(TENANT, TENANT, SECRET);
        let upload_service = UploadService::new(
            OriginalStore::new(dir.path()),
            Arc::new(directory),
            "https://img.example.com/",
        );
        let config = RouterConfig::new()
            .with_cache_max_age(3600)
            .with_max_upload_bytes(1024 * 1024)
            .with_tracing(false);
        let router = create_router(variant_service, upload_service, config);

        Self {
            dir,
            renderer,
            router,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn tenant_dir(&self) -> PathBuf {
        self.root().join(TENANT)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.tenant_dir().join("cache")
    }

    /// Place an original directly in the tenant folder.
    pub fn put_original(&self, file_name: &str, data: &[u8]) {
        std::fs::write(self.tenant_dir().join(file_name), data).unwrap();
    }

    /// Names of every file in the tenant's cache folder, sorted.
    pub fn cache_files(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.cache_dir()) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

// =============================================================================
// Request Helpers
// =============================================================================

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}

/// One part of a multipart form.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

const BOUNDARY: &str = "asset-server-test-boundary";

/// Build a `multipart/form-data` POST to `uri`.
pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}
