//! Serving tests for originals and variants.
//!
//! Tests verify:
//! - Originals are passed through byte-for-byte
//! - Variants are rendered on the first request and read from cache afterwards
//! - Invalid parameters and missing originals are rejected without side effects
//! - HTTP response codes and headers

use axum::http::StatusCode;
use tower::ServiceExt;

use super::test_utils::{body_bytes, body_json, get, header, png_bytes, TestServer};

// =============================================================================
// Originals
// =============================================================================

#[tokio::test]
async fn test_original_passthrough_is_byte_identical() {
    let server = TestServer::new();
    let original = png_bytes(40, 20);
    server.put_original("photo-1700000000000.png", &original);

    let response = server
        .router
        .clone()
        .oneshot(get("/acme/photo-1700000000000.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(
        header(&response, "cache-control"),
        "public, max-age=3600, immutable"
    );
    assert_eq!(header(&response, "x-variant-cache"), "passthrough");
    assert_eq!(body_bytes(response).await.as_ref(), original.as_slice());

    assert_eq!(server.renderer.calls(), 0);
    assert!(server.cache_files().is_empty());
}

#[tokio::test]
async fn test_missing_original_is_404() {
    let server = TestServer::new();

    let response = server
        .router
        .clone()
        .oneshot(get("/acme/nothing.webp?w=10"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
    assert_eq!(server.renderer.calls(), 0);
}

#[tokio::test]
async fn test_unknown_tenant_is_404() {
    let server = TestServer::new();

    let response = server
        .router
        .clone()
        .oneshot(get("/nobody/photo.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ambiguous_basename_is_409() {
    let server = TestServer::new();
    server.put_original("twin.png", &png_bytes(4, 4));
    server.put_original("twin.jpg", &png_bytes(4, 4));

    let response = server
        .router
        .clone()
        .oneshot(get("/acme/twin.webp"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"], "ambiguous_original");
}

// =============================================================================
// Variants
// =============================================================================

#[tokio::test]
async fn test_variant_miss_then_hit() {
    let server = TestServer::new();
    server.put_original("photo.png", &png_bytes(200, 100));

    let first = server
        .router
        .clone()
        .oneshot(get("/acme/photo.png?w=50&h=50&f=cover"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "x-variant-cache"), "miss");
    assert_eq!(header(&first, "content-type"), "image/png");
    let first_body = body_bytes(first).await;

    let rendered = image::load_from_memory(&first_body).unwrap();
    assert_eq!((rendered.width(), rendered.height()), (50, 50));

    let second = server
        .router
        .clone()
        .oneshot(get("/acme/photo.png?f=cover&h=50&w=50"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header(&second, "x-variant-cache"), "hit");
    assert_eq!(body_bytes(second).await, first_body);

    assert_eq!(server.renderer.calls(), 1);
    assert_eq!(
        server.cache_files(),
        vec!["photo_w50_h50_fcover_g0_i0_b0_q80.png".to_string()]
    );
}

#[tokio::test]
async fn test_missing_extension_renders_webp() {
    let server = TestServer::new();
    server.put_original("photo.png", &png_bytes(16, 16));

    let response = server
        .router
        .clone()
        .oneshot(get("/acme/photo"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/webp");
    let body = body_bytes(response).await;
    assert_eq!(&body[..4], b"RIFF");
    assert_eq!(&body[8..12], b"WEBP");
}

#[tokio::test]
async fn test_format_conversion_to_jpeg() {
    let server = TestServer::new();
    server.put_original("photo.png", &png_bytes(30, 30));

    let response = server
        .router
        .clone()
        .oneshot(get("/acme/photo.jpg?q=50&grey=1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/jpeg");
    let body = body_bytes(response).await;
    assert_eq!(&body[..2], &[0xFF, 0xD8]);
    assert_eq!(
        server.cache_files(),
        vec!["photo_wauto_hauto_finside_g1_i0_b0_q50.jpg".to_string()]
    );
}

#[tokio::test]
async fn test_invalid_fit_is_400_without_side_effects() {
    let server = TestServer::new();
    server.put_original("photo.png", &png_bytes(10, 10));

    let response = server
        .router
        .clone()
        .oneshot(get("/acme/photo.webp?w=10&f=stretch"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_parameter");
    assert_eq!(json["status"], 400);

    assert_eq!(server.renderer.calls(), 0);
    assert!(!server.cache_dir().exists());
}

#[tokio::test]
async fn test_oversized_dimension_is_400() {
    let server = TestServer::new();
    server.put_original("photo.png", &png_bytes(10, 10));

    let response = server
        .router
        .clone()
        .oneshot(get("/acme/photo.webp?w=100000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.renderer.calls(), 0);
}

#[tokio::test]
async fn test_excessive_blur_is_400() {
    let server = TestServer::new();
    server.put_original("photo.png", &png_bytes(20, 20));

    let response = server
        .router
        .clone()
        .oneshot(get("/acme/photo.png?blur=1000000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_parameter");
    assert_eq!(server.renderer.calls(), 0);
    assert!(!server.cache_dir().exists());
}

#[tokio::test]
async fn test_outside_fit_beyond_max_dimension_is_400() {
    let server = TestServer::new();
    server.put_original("sliver.png", &png_bytes(1, 1000));

    let response = server
        .router
        .clone()
        .oneshot(get("/acme/sliver.png?w=8192&f=outside"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_parameter");
    assert!(server.cache_files().is_empty());
}

#[tokio::test]
async fn test_malformed_query_is_json_400() {
    let server = TestServer::new();
    server.put_original("photo.png", &png_bytes(10, 10));

    let response = server
        .router
        .clone()
        .oneshot(get("/acme/photo.png?w=1&w=2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&response, "content-type"), "application/json");
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_parameter");
    assert_eq!(server.renderer.calls(), 0);
}

#[tokio::test]
async fn test_corrupt_original_is_500_and_not_cached() {
    let server = TestServer::new();
    server.put_original("broken.png", b"definitely not a png");

    let response = server
        .router
        .clone()
        .oneshot(get("/acme/broken.webp?w=10"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"], "decode_error");
    assert!(server.cache_files().is_empty());
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let server = TestServer::new();

    let response = server.router.clone().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}
