mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use common::{sample_body, CountingPayment, UnavailableBroker};
use order_relay::api::{self, AppState};
use order_relay::{Broker, InMemoryBroker, OrderService};

const TOPIC: &str = "orders.submitted";

fn app_with(broker: Arc<dyn Broker>) -> Router {
    let payments = CountingPayment::new(Duration::from_millis(10));
    let orders = Arc::new(OrderService::new(payments, broker, TOPIC));
    api::router(AppState { orders })
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_sync_order_returns_completed() {
    let app = app_with(Arc::new(InMemoryBroker::new()));

    let response = app.oneshot(post("/orders/sync", sample_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["customer_id"], 1);
    assert_eq!(body["items"][0]["product_id"], "p1");
    assert!(body["order_id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn test_async_order_is_accepted_and_queued() {
    let broker = Arc::new(InMemoryBroker::new());
    let app = app_with(broker.clone());

    let response = app.oneshot(post("/orders/async", sample_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = json_body(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(broker.depth(TOPIC), 1);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let broker = Arc::new(InMemoryBroker::new());
    let app = app_with(broker.clone());

    let response = app.oneshot(post("/orders/async", "{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert!(body["error"]
        .as_str()
        .is_some_and(|msg| msg.starts_with("Invalid request body")));
    assert_eq!(broker.depth(TOPIC), 0);
}

#[tokio::test]
async fn test_invalid_quantity_is_rejected() {
    let app = app_with(Arc::new(InMemoryBroker::new()));
    let body = r#"{"customer_id":1,"items":[{"product_id":"p1","quantity":0,"price":1.0}]}"#;

    let response = app.oneshot(post("/orders/sync", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_order_is_rejected() {
    let app = app_with(Arc::new(InMemoryBroker::new()));

    let response = app
        .oneshot(post("/orders/async", r#"{"customer_id":1,"items":[]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = app_with(Arc::new(InMemoryBroker::new()));

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");

    let response = app.oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["payment_gate"], "idle");
}

#[tokio::test]
async fn test_unavailable_broker() {
    let app = app_with(Arc::new(UnavailableBroker));

    let response = app
        .clone()
        .oneshot(post("/orders/async", sample_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["error"], "Failed to queue order");

    let response = app.clone().oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // The synchronous path never touches the broker
    let response = app.oneshot(post("/orders/sync", sample_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
