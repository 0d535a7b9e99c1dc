//! Converts a [`ProxyError`] into the two shapes spec.md §7's propagation
//! policy calls for: a plain HTTP error response when nothing has been
//! written to the client yet, and an inline `event: error` SSE frame plus
//! stream termination once the first byte is already out.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;
use ccproxy_core::error::ProxyError;

fn status_for(err: &ProxyError) -> StatusCode {
    match err {
        ProxyError::Config(_) | ProxyError::Routing(_) => StatusCode::BAD_REQUEST,
        ProxyError::UnsupportedOperation { .. } => StatusCode::NOT_IMPLEMENTED,
        ProxyError::UpstreamTransport { status, .. } => {
            status.and_then(|s| StatusCode::from_u16(s).ok()).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        ProxyError::Transform { .. } | ProxyError::Serialization(_) | ProxyError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Pre-first-byte error: a standalone HTTP response carrying the
/// Anthropic-shaped error body.
pub fn to_http_response(err: &ProxyError, correlation_id: &str) -> Response {
    let status = status_for(err);
    let body = err.to_anthropic_error_body(correlation_id);
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .header(crate::correlation::CORRELATION_HEADER, correlation_id)
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::from("internal error")))
}

/// Post-first-byte error: one inline SSE `event: error` frame. The caller
/// terminates the stream right after yielding this.
pub fn to_sse_frame(err: &ProxyError, correlation_id: &str) -> String {
    ccproxy_sse::events::frame_event("error", &err.to_anthropic_error_body(correlation_id))
}
