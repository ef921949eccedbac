//! HTTP front end for order submission.
//!
//! | Route | Result |
//! |---|---|
//! | `POST /orders/sync` | 200 with the completed order |
//! | `POST /orders/async` | 202 with the pending order |
//! | `GET /health` | liveness |
//! | `GET /ready` | 200 when the broker is connected, else 503 |

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::order::{Order, OrderRequest};
use crate::producer::{OrderService, SubmitError};

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders/sync", post(create_sync_order))
        .route("/orders/async", post(create_async_order))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn parse_request(body: &str) -> Result<OrderRequest, ApiError> {
    serde_json::from_str(body)
        .map_err(|e| ApiError::ValidationError(format!("Invalid request body: {}", e)))
}

/// Process an order while the caller waits
async fn create_sync_order(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let request = parse_request(&body)?;
    let order = state.orders.submit_sync(request).await?;
    Ok((StatusCode::OK, Json(order)))
}

/// Queue an order for the worker pool
async fn create_async_order(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let request = parse_request(&body)?;
    let accepted = state.orders.submit_async(request).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted.order)))
}

/// Health check endpoint (liveness)
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "order-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check endpoint - verifies the broker connection
async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if state.orders.broker().is_connected() {
        Ok(Json(serde_json::json!({
            "status": "ready",
            "service": "order-api",
            "broker": "connected",
            "payment_gate": if state.orders.gate().is_held() { "busy" } else { "idle" },
        })))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

// Error handling

#[derive(Debug)]
pub enum ApiError {
    ValidationError(String),
    Unavailable(String),
    InternalError(String),
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Validation(_) => ApiError::ValidationError(e.to_string()),
            SubmitError::Publish(_) => ApiError::Unavailable("Failed to queue order".to_string()),
            SubmitError::Serialize(_) => ApiError::InternalError(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({
            "error": message
        }))).into_response()
    }
}
