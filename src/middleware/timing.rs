//! Per-request timing and size headers.
//!
//! Adds `X-Process-Time-Ms` and `X-Response-Length` to every response and
//! emits one `Request processed` log line.

use std::time::Instant;

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use crate::core::types::ApiResponse;

pub const PROCESS_TIME_HEADER: &str = "x-process-time-ms";
pub const RESPONSE_LENGTH_HEADER: &str = "x-response-length";

pub async fn process_timing(request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();

    // Buffer to learn the length; responses here are bounded JSON envelopes.
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(method = %method, path = %path, error = %e, "Failed to buffer response body");
            return (
                parts.status,
                Json(ApiResponse::error(format!("Failed to read response body: {}", e))),
            )
                .into_response();
        }
    };

    let duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
    let response_length = bytes.len();

    if let Ok(value) = HeaderValue::from_str(&format!("{:.2}", duration_ms)) {
        parts.headers.insert(PROCESS_TIME_HEADER, value);
    }
    parts
        .headers
        .insert(RESPONSE_LENGTH_HEADER, HeaderValue::from(response_length));

    info!(
        method = %method,
        path = %path,
        status = parts.status.as_u16(),
        duration_ms = duration_ms,
        response_length = response_length,
        "Request processed"
    );

    Response::from_parts(parts, Body::from(bytes))
}
