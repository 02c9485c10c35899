//! HTTP surface: status codes and JSON bodies for upload, delete and probe.

mod helpers;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use cellar_images::http::{self, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use helpers::{encode_jpeg, test_pipeline};

const BOUNDARY: &str = "cellar-test-boundary";

async fn app(max_file_size: usize) -> (TempDir, Router) {
    let (dir, pipeline) = test_pipeline(max_file_size, 1200).await;
    let router = http::router(AppState {
        pipeline,
        public_base_url: "http://cellar.test".to_string(),
    });
    (dir, router)
}

fn multipart_upload(owner: &str, field: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"label.jpg\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(format!("/api/wines/{owner}/image"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn upload_returns_created_with_public_url() {
    let (_dir, app) = app(1024 * 1024).await;

    let response = app
        .oneshot(multipart_upload("W1", "image", "image/jpeg", &encode_jpeg(30, 20)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["fileName"], "W1.jpg");
    assert_eq!(body["mimeType"], "image/jpeg");
    assert_eq!(body["url"], "http://cellar.test/uploads/W1.jpg");
    assert_eq!(body["width"], 30);
}

#[tokio::test]
async fn spoofed_executable_maps_to_unsupported_media_type() {
    let (_dir, app) = app(1024 * 1024).await;

    let response = app
        .oneshot(multipart_upload("W1", "file", "image/jpeg", b"MZ\x90\x00\x03\x00"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body = json_body(response).await;
    assert_eq!(body["code"], "unsupported_detected_type");
}

#[tokio::test]
async fn one_byte_over_the_limit_reaches_the_validator() {
    let max = 4096;
    let (_dir, app) = app(max).await;
    let mut payload = encode_jpeg(8, 8);
    payload.resize(max + 1, 0);

    let response = app
        .oneshot(multipart_upload("W1", "image", "image/jpeg", &payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert_eq!(body["code"], "file_too_large");
    assert!(body["error"].as_str().unwrap().contains("maximum of 0.00 MB (4096 bytes)"));
}

#[tokio::test]
async fn missing_file_part_is_a_bad_request() {
    let (_dir, app) = app(1024 * 1024).await;

    let response = app
        .oneshot(multipart_upload("W1", "notes", "text/plain", b"a fine claret"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "invalid_request");
}

#[tokio::test]
async fn delete_is_no_content_even_when_nothing_is_stored() {
    let (_dir, app) = app(1024 * 1024).await;

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/wines/W9/image")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn exists_probe_reflects_uploads() {
    let (_dir, app) = app(1024 * 1024).await;

    let probe = || {
        Request::builder()
            .uri("/api/wines/W5/image/exists")
            .body(Body::empty())
            .unwrap()
    };
    let before = app.clone().oneshot(probe()).await.unwrap();
    assert_eq!(json_body(before).await["exists"], false);

    let uploaded = app
        .clone()
        .oneshot(multipart_upload("W5", "image", "image/jpeg", &encode_jpeg(12, 12)))
        .await
        .unwrap();
    assert_eq!(uploaded.status(), StatusCode::CREATED);

    let after = app.clone().oneshot(probe()).await.unwrap();
    assert_eq!(json_body(after).await["exists"], true);

    let served = app
        .oneshot(
            Request::builder()
                .uri("/uploads/W5.jpg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(served.status(), StatusCode::OK);
}

fn raw_upload(owner: &str, content_type: &str, bytes: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/wines/{owner}/image"))
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .unwrap()
}

#[tokio::test]
async fn raw_body_upload_uses_request_content_type() {
    let (_dir, app) = app(1024 * 1024).await;

    let response = app
        .oneshot(raw_upload("W6", "image/jpeg", encode_jpeg(24, 16)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["fileName"], "W6.jpg");
    assert_eq!(body["height"], 16);
}

#[tokio::test]
async fn raw_body_with_foreign_content_type_is_rejected() {
    let (_dir, app) = app(1024 * 1024).await;

    let response = app
        .oneshot(raw_upload("W6", "application/octet-stream", encode_jpeg(8, 8)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json_body(response).await["code"], "unsupported_declared_type");
}
