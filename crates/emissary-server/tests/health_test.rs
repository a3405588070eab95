mod helpers;

use axum::http::StatusCode;
use helpers::client;
use serde_json::Value;

#[tokio::test]
async fn alive_returns_up() {
    let response = client().get("/alive").await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "UP");
}

#[tokio::test]
async fn health_returns_json() {
    let response = client().get("/health").await;

    let content_type = response.header("content-type").unwrap();
    assert!(content_type.contains("application/json"));
}

#[tokio::test]
async fn health_is_up_while_worker_serves() {
    let response = client().get("/health").await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "UP");
    assert_eq!(body["checks"]["cacheWorker"], "READY");
}

#[tokio::test]
async fn health_is_down_after_worker_stops() {
    let client = client();
    client.state().worker().stop();

    let response = client.get("/health").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["status"], "DOWN");
    assert_eq!(body["checks"]["cacheWorker"], "STOPPED");
}

#[tokio::test]
async fn alive_stays_up_after_worker_stops() {
    let client = client();
    client.state().worker().stop();

    client.get("/alive").await.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn requests_fail_fast_after_worker_stops() {
    let client = client();
    client.state().worker().stop();

    client.get("/api").await.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_endpoint_responds() {
    let response = client().get("/metrics").await;

    response.assert_status(StatusCode::OK);
}
