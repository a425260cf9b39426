use super::*;
use crate::service::test_helpers::{StubRunner, create_test_downloader, wait_until};
use crate::types::{JobId, Phase};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use std::time::Duration;
use tower::ServiceExt;


/// Helper to create a test SliceDownloader wrapped in Arc
async fn create_test_app(
    runner: Arc<StubRunner>,
) -> (Arc<SliceDownloader>, Router, tempfile::TempDir) {
    let (downloader, temp_dir) = create_test_downloader(runner).await;
    let downloader = Arc::new(downloader);
    let app = create_router(downloader.clone(), downloader.config.clone());
    (downloader, app, temp_dir)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn start_body() -> serde_json::Value {
    serde_json::json!({
        "url": "https://media.example.com/watch?v=abc",
        "startTime": 10,
        "endTime": 15,
        "filename": "my clip"
    })
}

async fn start_job(app: &Router) -> JobId {
    let response = app
        .clone()
        .oneshot(post_json("/api/v1/jobs", start_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    serde_json::from_value(json_body(response).await["jobId"].clone()).unwrap()
}

async fn wait_for_phase(downloader: &SliceDownloader, id: &JobId, phase: Phase) {
    wait_until(|| downloader.job_info(id).map(|info| info.phase).ok() == Some(phase)).await;
}

#[tokio::test]
async fn test_api_server_spawns_and_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = crate::service::test_helpers::test_config(&dir);
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let downloader = Arc::new(
        SliceDownloader::with_runner(config, StubRunner::succeeding())
            .await
            .unwrap(),
    );

    let api_handle = downloader.spawn_api_server();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished());

    downloader.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_health_is_nested_under_api_prefix() {
    let (_downloader, app, _dir) = create_test_app(StubRunner::succeeding()).await;

    let response = app.clone().oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["accepting"], true);

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_openapi_endpoint_serves_spec() {
    let (_downloader, app, _dir) = create_test_app(StubRunner::succeeding()).await;

    let response = app.oneshot(get("/api/v1/openapi.json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let spec = json_body(response).await;
    assert!(spec["paths"]["/api/v1/jobs"].is_object());
}

#[tokio::test]
async fn test_cors_enabled() {
    let (downloader, _app, _dir) = create_test_app(StubRunner::succeeding()).await;
    let mut config = (*downloader.config).clone();
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["*".to_string()];
    let app = create_router(downloader, Arc::new(config));

    let request = Request::builder()
        .uri("/api/v1/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_api_key_protects_api_but_not_swagger() {
    let (downloader, _app, _dir) = create_test_app(StubRunner::succeeding()).await;
    let mut config = (*downloader.config).clone();
    config.server.api.api_key = Some("secret".to_string());
    let app = create_router(downloader, Arc::new(config));

    let response = app.clone().oneshot(get("/api/v1/jobs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get("/api/v1/jobs?api_key=secret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/swagger-ui/")).await.unwrap();
    assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
}
