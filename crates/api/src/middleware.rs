use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// One structured log line per request.
pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let latency_ms = started.elapsed().as_millis() as u64;
    if status.is_server_error() {
        tracing::error!(%method, path, status = status.as_u16(), latency_ms, "request failed");
    } else {
        tracing::info!(%method, path, status = status.as_u16(), latency_ms, "request handled");
    }

    response
}
