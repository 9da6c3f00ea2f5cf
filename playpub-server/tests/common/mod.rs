//! Shared helpers for the HTTP integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use playpub_server::{
    api, config::ServerConfig, repository::InMemoryJobStore, service::BuildService,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "playpub-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub uploads: TempDir,
}

pub fn test_app(stage_delay: Duration) -> TestApp {
    test_app_with_limit(stage_delay, ServerConfig::default().max_upload_bytes)
}

pub fn test_app_with_limit(stage_delay: Duration, max_upload_bytes: usize) -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        upload_dir: uploads.path().to_path_buf(),
        stage_delay,
        max_upload_bytes,
        ..ServerConfig::default()
    };

    let service = BuildService::from_config(&config, Arc::new(InMemoryJobStore::new()));
    let router = api::create_router(Arc::new(service), config.max_upload_bytes);

    TestApp { router, uploads }
}

/// One part of a multipart request
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();

    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// A complete submission with the given config JSON, an APK and a keystore
pub fn submission(config: &str) -> Vec<u8> {
    multipart_body(&[
        Part::Text("config", config),
        Part::File("apkFile", "app-release.apk", b"PK\x03\x04apk"),
        Part::File("keyStoreFile", "upload.jks", b"keystore"),
    ])
}

pub async fn submit(router: &Router, body: Vec<u8>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/generate-aab")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    send(router, request).await
}

pub async fn call(router: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(router, request).await
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Polls a build until it reaches a terminal status
pub async fn wait_terminal(router: &Router, id: &str) -> Value {
    for _ in 0..500 {
        let (status, job) = call(router, Method::GET, &format!("/api/build/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        if job["status"] == "COMPLETED" || job["status"] == "FAILED" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("build {} did not finish", id);
}
