//! HTTP middleware

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

use super::routes::X_REQUEST_ID;

/// Bounds the time until response headers; a streaming body may run longer.
pub fn create_timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::new(timeout)
}

pub fn create_trace_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
}

/// Access log line per request, tagged with the render request id when the
/// handler assigned one.
pub async fn request_logger(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    let request_id = render_request_id(response.headers()).unwrap_or("-");

    if response.status().is_client_error() || response.status().is_server_error() {
        warn!(%method, %uri, status, duration_ms, request_id, "request failed");
    } else {
        info!(%method, %uri, status, duration_ms, request_id, "request completed");
    }

    response
}

fn render_request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
}
