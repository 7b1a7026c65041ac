//! Upload tests.
//!
//! Tests verify:
//! - A valid upload is stored under the tenant folder and its URL returned
//! - Missing, unknown or wrong credentials all look alike (403)
//! - Missing or non-image files are rejected (400) and nothing is stored
//! - An uploaded original can be fetched and transformed straight away

use axum::http::StatusCode;
use tower::ServiceExt;

use super::test_utils::{
    body_json, get, header, multipart_request, png_bytes, Part, TestServer, SECRET,
};

fn stored_originals(server: &TestServer) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(server.tenant_dir())
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().unwrap().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Success
// =============================================================================

#[tokio::test]
async fn test_upload_stores_original_and_returns_url() {
    let server = TestServer::new();
    let image = png_bytes(24, 12);

    let request = multipart_request(
        "/acme/upload",
        &[
            Part::Text("userSecret", SECRET),
            Part::File("image", "My Cat.png", &image),
        ],
    );
    let response = server.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let url = json["url"].as_str().unwrap();
    assert!(
        url.starts_with("https://img.example.com/acme/My_Cat-"),
        "unexpected url {url}"
    );

    let basename = url.rsplit('/').next().unwrap();
    let stored = stored_originals(&server);
    assert_eq!(stored, vec![format!("{basename}.png")]);
    assert_eq!(
        std::fs::read(server.tenant_dir().join(&stored[0])).unwrap(),
        image
    );
}

#[tokio::test]
async fn test_uploaded_original_is_servable() {
    let server = TestServer::new();
    let image = png_bytes(64, 32);

    let request = multipart_request(
        "/acme/upload",
        &[
            Part::File("image", "banner.png", &image),
            Part::Text("userSecret", SECRET),
        ],
    );
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let basename = json["url"].as_str().unwrap().rsplit('/').next().unwrap().to_string();

    let response = server
        .router
        .clone()
        .oneshot(get(&format!("/acme/{basename}.png")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-variant-cache"), "passthrough");

    let response = server
        .router
        .clone()
        .oneshot(get(&format!("/acme/{basename}.png?w=16&f=fill")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-variant-cache"), "miss");
}

// =============================================================================
// Credentials
// =============================================================================

#[tokio::test]
async fn test_refused_credentials_are_indistinguishable() {
    let image = png_bytes(4, 4);
    let cases = [
        ("/acme/upload", None),
        ("/acme/upload", Some("wrong secret")),
        ("/ghost/upload", Some(SECRET)),
    ];

    for (uri, secret) in cases {
        let server = TestServer::new();
        let mut parts = vec![Part::File("image", "a.png", &image)];
        if let Some(secret) = secret {
            parts.push(Part::Text("userSecret", secret));
        }

        let response = server
            .router
            .clone()
            .oneshot(multipart_request(uri, &parts))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri} {secret:?}");
        let json = body_json(response).await;
        assert_eq!(json["error"], "forbidden");
        assert_eq!(json["message"], "Invalid credentials");
        assert!(stored_originals(&server).is_empty());
    }
}

#[tokio::test]
async fn test_empty_secret_is_forbidden() {
    let server = TestServer::new();
    let image = png_bytes(4, 4);

    let request = multipart_request(
        "/acme/upload",
        &[
            Part::Text("userSecret", ""),
            Part::File("image", "a.png", &image),
        ],
    );
    let response = server.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// File Validation
// =============================================================================

#[tokio::test]
async fn test_missing_image_field_is_400() {
    let server = TestServer::new();

    let request = multipart_request("/acme/upload", &[Part::Text("userSecret", SECRET)]);
    let response = server.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "missing_field");
}

#[tokio::test]
async fn test_non_image_is_400() {
    let server = TestServer::new();

    let request = multipart_request(
        "/acme/upload",
        &[
            Part::Text("userSecret", SECRET),
            Part::File("image", "notes.png", b"just some text"),
        ],
    );
    let response = server.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_file");
    assert!(stored_originals(&server).is_empty());
}

#[tokio::test]
async fn test_non_multipart_body_is_400() {
    let server = TestServer::new();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/acme/upload")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{}"))
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_multipart");
}
