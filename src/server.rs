//! HTTP surface
//!
//! Exposes the remote-storage endpoints Prometheus is pointed at:
//!
//! | Route      | Method | Body                                   |
//! |------------|--------|----------------------------------------|
//! | `/write`   | POST   | snappy-compressed protobuf `WriteRequest` |
//! | `/read`    | POST   | snappy-compressed protobuf `ReadRequest`  |
//! | `/health`  | GET    | JSON backend status                    |
//! | `/metrics` | GET    | Prometheus text exposition             |
//!
//! `/write` answers 200 once every backend has answered, whether or not it
//! stored the samples; failures are only logged and counted. A body that does
//! not decode is a 400.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::backend::Backend;
use crate::bridge::Bridge;
use crate::codec;
use crate::error::{CodecError, Error};
use crate::observer::PrometheusObserver;

/// Largest compressed request body accepted (32 MiB)
pub const MAX_BODY_SIZE: usize = 32 * 1024 * 1024;

/// Shared state of the HTTP handlers
pub struct AppState {
    /// Request router
    pub bridge: Bridge,
    /// Metrics exposed on `/metrics`; `None` disables the endpoint
    pub metrics: Option<Arc<PrometheusObserver>>,
}

/// Build the router with request timeout and tracing layers
pub fn build_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/write", post(write))
        .route("/read", post(read))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(timeout_layer(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Requests running longer than `request_timeout` are answered with 408
fn timeout_layer(request_timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout)
}

/// Status code for a request-level error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::UnsupportedMatcher { .. } => StatusCode::BAD_REQUEST,
        Error::Codec(CodecError::Decompress(_) | CodecError::Decode(_)) => StatusCode::BAD_REQUEST,
        Error::Codec(CodecError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Configuration(_) | Error::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    (status_for(&err), err.to_string()).into_response()
}

async fn write(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let batch = match codec::decode_write_request(&body) {
        Ok(batch) => batch,
        Err(e) => {
            error!(error = %e, "Error decoding remote write request");
            return error_response(e.into());
        },
    };

    let report = state.bridge.write(&batch).await;
    debug!(
        series = batch.len(),
        commands = report.commands,
        rejected_series = report.rejected_series,
        rejected_samples = report.rejected_samples,
        "Remote write handled"
    );
    StatusCode::OK.into_response()
}

async fn read(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let queries = match codec::decode_read_request(&body) {
        Ok(queries) => queries,
        Err(e) => {
            error!(error = %e, "Error decoding remote read request");
            return error_response(e.into());
        },
    };

    let results = match state.bridge.read(&queries).await {
        Ok(results) => results,
        Err(e) => return error_response(e),
    };

    match codec::encode_read_response(&results) {
        Ok(encoded) => (
            [
                (header::CONTENT_TYPE, "application/x-protobuf"),
                (header::CONTENT_ENCODING, "snappy"),
            ],
            encoded,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Error encoding remote read response");
            error_response(e.into())
        },
    }
}

/// Status of one backend in the health report
#[derive(Debug, Serialize)]
pub struct BackendHealth {
    /// Backend name
    pub name: String,
    /// Whether the backend answered the probe
    pub healthy: bool,
    /// Probe error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `/health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Every distinct configured backend
    pub backends: Vec<BackendHealth>,
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let mut seen: Vec<usize> = Vec::new();
    let mut backends = Vec::new();

    for backend in state.bridge.writers().iter().chain(state.bridge.readers()) {
        let ptr = Arc::as_ptr(backend) as *const () as usize;
        if seen.contains(&ptr) {
            continue;
        }
        seen.push(ptr);
        backends.push(probe(backend.as_ref()).await);
    }

    let healthy = backends.iter().all(|b| b.healthy);
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        backends,
    };
    (code, Json(body)).into_response()
}

async fn probe(backend: &dyn Backend) -> BackendHealth {
    match backend.ping().await {
        Ok(()) => BackendHealth {
            name: backend.name().to_string(),
            healthy: true,
            error: None,
        },
        Err(e) => {
            warn!(storage = backend.name(), error = %e, "Backend health probe failed");
            BackendHealth {
                name: backend.name().to_string(),
                healthy: false,
                error: Some(e.to_string()),
            }
        },
    }
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(observer) = &state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match observer.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}
