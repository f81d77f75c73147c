//! API Integration Tests
//!
//! Drives the full router (middleware included) over the in-memory store.

use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use trainer_workload::api::{self, AppState};
use trainer_workload::domain::message::HEADER_CORRELATION_ID;
use trainer_workload::domain::ChangeEvent;
use trainer_workload::messaging::MessageBroker;

mod common;

use common::{TestHarness, QUEUE};

fn app(h: &TestHarness) -> Router {
    api::build_router(AppState::new(h.engine.clone(), h.broker_dyn(), QUEUE))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn training(username: &str, date: &str, minutes: i64, action: &str) -> Value {
    json!({
        "username": username,
        "first_name": "Alice",
        "last_name": "Smith",
        "active": true,
        "training_date": date,
        "duration_minutes": minutes,
        "action_type": action,
    })
}

#[tokio::test]
async fn test_health_check() {
    let h = TestHarness::in_memory();
    let response = app(&h).oneshot(empty_request("GET", "/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_workload_lifecycle() {
    let h = TestHarness::in_memory();
    let app = app(&h);

    // 1. Record two trainings in May
    for minutes in [40, 20] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/workloads",
                training("alice", "2025-05-14", minutes, "ADD"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "ADD failed");
    }

    // 2. Read the month back
    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/workloads/alice/2025/5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let monthly = body_json(response).await;
    assert_eq!(monthly["duration_minutes"], 60);
    assert_eq!(monthly["first_name"], "Alice");

    // 3. Overwrite it
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/v1/workloads/alice/2025/5",
            json!({
                "first_name": "Alice",
                "last_name": "Jones",
                "active": false,
                "duration_minutes": 45,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let change = body_json(response).await;
    assert_eq!(change["duration_minutes"], 45);

    // 4. Summary reflects the replaced value and profile
    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/workloads/alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["last_name"], "Jones");
    assert_eq!(summary["active"], false);
    assert_eq!(summary["years"][0]["year"], 2025);
    assert_eq!(summary["years"][0]["total_minutes"], 45);
    assert_eq!(summary["years"][0]["months"][0]["month"], 5);

    // 5. Delete the month
    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/api/v1/workloads/alice/2025/5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/workloads/alice/2025/5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error = body_json(response).await;
    assert_eq!(error["error_code"], "month_not_found");
}

#[tokio::test]
async fn test_subtract_more_than_recorded_is_rejected() {
    let h = TestHarness::in_memory();
    let app = app(&h);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/workloads",
            training("alice", "2025-05-14", 30, "ADD"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/workloads",
            training("alice", "2025-05-20", 45, "DELETE"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error_code"], "insufficient_workload");

    // Stored value untouched
    let response = app
        .oneshot(empty_request("GET", "/api/v1/workloads/alice/2025/5"))
        .await
        .unwrap();
    let monthly = body_json(response).await;
    assert_eq!(monthly["duration_minutes"], 30);
}

#[tokio::test]
async fn test_invalid_requests() {
    let h = TestHarness::in_memory();
    let app = app(&h);

    // Blank username
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/workloads",
            training("  ", "2025-05-14", 30, "ADD"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "invalid_request");

    // Non-positive duration
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/workloads",
            training("alice", "2025-05-14", 0, "ADD"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "invalid_duration");

    // Month out of range
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/v1/workloads/alice/2025/13",
            json!({
                "first_name": "Alice",
                "last_name": "Smith",
                "active": true,
                "duration_minutes": 30,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error_code"], "invalid_period");
}

#[tokio::test]
async fn test_missing_trainer_returns_not_found() {
    let h = TestHarness::in_memory();
    let app = app(&h);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/workloads/ghost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error_code"], "trainer_not_found");

    // Replace never creates a trainer
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/v1/workloads/ghost/2025/5",
            json!({
                "first_name": "G",
                "last_name": "Host",
                "active": true,
                "duration_minutes": 30,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(empty_request("DELETE", "/api/v1/workloads/ghost/2025/5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let h = TestHarness::in_memory();
    let app = app(&h);

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/workloads/ghost")
        .header("X-Correlation-Id", "corr-123")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("x-correlation-id").unwrap(),
        "corr-123"
    );

    // Generated when absent
    let response = app
        .oneshot(empty_request("GET", "/api/v1/workloads/ghost"))
        .await
        .unwrap();
    let generated = response.headers().get("x-correlation-id").unwrap();
    assert!(!generated.is_empty());
}

#[tokio::test]
async fn test_publish_message_queues_event() {
    let h = TestHarness::in_memory();
    let app = app(&h);

    let event = ChangeEvent::create_update("alice", "Alice", "Smith", true, 2025, 5, 60)
        .with_correlation_id("msg-1");
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/messages",
            serde_json::to_value(&event).unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let accepted = body_json(response).await;
    assert_eq!(accepted["correlation_id"], "msg-1");
    assert_eq!(accepted["queue"], QUEUE);

    assert_eq!(h.broker.pending(QUEUE).await.unwrap(), 1);
    let delivery = h
        .broker
        .receive(QUEUE, Duration::from_millis(100))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.message.header(HEADER_CORRELATION_ID), Some("msg-1"));

    let queued: ChangeEvent = serde_json::from_slice(&delivery.message.body).unwrap();
    assert_eq!(queued, event);
}
