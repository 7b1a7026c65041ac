//! Concurrency tests for variant generation.
//!
//! Tests verify:
//! - Concurrent requests for one variant trigger exactly one render
//! - Every waiter receives the same bytes
//! - A failed render is reported to all waiters and never cached
//! - The next request after a failure starts a fresh render
//! - No staging files are left behind

use std::time::Duration;

use axum::http::StatusCode;
use bytes::Bytes;
use tower::ServiceExt;

use super::test_utils::{body_bytes, get, header, png_bytes, CountingRenderer, TestServer};

const CONCURRENT_REQUESTS: usize = 16;

async fn fire(server: &TestServer, uri: &'static str) -> Vec<(StatusCode, String, Bytes)> {
    let mut handles = Vec::with_capacity(CONCURRENT_REQUESTS);
    for _ in 0..CONCURRENT_REQUESTS {
        let router = server.router.clone();
        handles.push(tokio::spawn(async move {
            let response = router.oneshot(get(uri)).await.unwrap();
            let status = response.status();
            let outcome = response
                .headers()
                .get("x-variant-cache")
                .map(|v| v.to_str().unwrap().to_string())
                .unwrap_or_default();
            (status, outcome, body_bytes(response).await)
        }));
    }

    let mut results = Vec::with_capacity(CONCURRENT_REQUESTS);
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_render_once() {
    let server =
        TestServer::with_renderer(CountingRenderer::new().with_delay(Duration::from_millis(300)));
    server.put_original("photo.png", &png_bytes(120, 80));

    let results = fire(&server, "/acme/photo.webp?w=60").await;

    assert_eq!(server.renderer.calls(), 1);

    let first = &results[0].2;
    for (status, outcome, body) in &results {
        assert_eq!(*status, StatusCode::OK);
        assert!(
            matches!(outcome.as_str(), "miss" | "joined" | "hit"),
            "unexpected outcome {outcome}"
        );
        assert_eq!(body, first);
    }
    assert_eq!(
        results.iter().filter(|(_, o, _)| o == "miss").count(),
        1,
        "exactly one request leads the render"
    );

    assert_eq!(
        server.cache_files(),
        vec!["photo_w60_h60_finside_g0_i0_b0_q80.webp".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_variants_render_independently() {
    let server = TestServer::new();
    server.put_original("photo.png", &png_bytes(64, 64));

    let a = server
        .router
        .clone()
        .oneshot(get("/acme/photo.png?w=10"));
    let b = server
        .router
        .clone()
        .oneshot(get("/acme/photo.png?w=20"));
    let (a, b) = tokio::join!(a, b);

    assert_eq!(a.unwrap().status(), StatusCode::OK);
    assert_eq!(b.unwrap().status(), StatusCode::OK);
    assert_eq!(server.renderer.calls(), 2);
    assert_eq!(server.cache_files().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_is_shared_then_retried() {
    let server =
        TestServer::with_renderer(CountingRenderer::new().with_delay(Duration::from_millis(300)));
    server.put_original("photo.png", &png_bytes(50, 50));
    server.renderer.set_failing(true);

    let results = fire(&server, "/acme/photo.webp?w=25&invert=1").await;

    assert_eq!(server.renderer.calls(), 1);
    for (status, _, _) in &results {
        assert_eq!(*status, StatusCode::INTERNAL_SERVER_ERROR);
    }
    assert!(server.cache_files().is_empty());

    server.renderer.set_failing(false);
    let response = server
        .router
        .clone()
        .oneshot(get("/acme/photo.webp?w=25&invert=1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-variant-cache"), "miss");
    assert_eq!(server.renderer.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_staging_files_remain() {
    let server = TestServer::new();
    server.put_original("photo.png", &png_bytes(32, 32));

    for uri in [
        "/acme/photo.webp?w=8",
        "/acme/photo.jpg?w=8",
        "/acme/photo.png?w=8&blur=1.5",
    ] {
        let response = server.router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let files = server.cache_files();
    assert_eq!(files.len(), 3);
    assert!(
        files.iter().all(|name| !name.starts_with('.')),
        "leftover staging files: {files:?}"
    );
}
