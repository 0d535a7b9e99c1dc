//! Correlation id middleware (SPEC_FULL.md §12.4, spec.md §6.1/§4.1):
//! honour an inbound `X-Correlation-ID`, generate one when absent, echo it
//! on the response. A small `tower` layer wrapping the axum `Router`,
//! alongside `tower-http`'s layers for the other cross-cutting concerns.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Request extension carrying the resolved correlation id for handlers.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

pub async fn correlation_id_layer(mut request: Request, next: Next) -> Response {
    let header_name = HeaderName::from_static(CORRELATION_HEADER);
    let id = request
        .headers()
        .get(&header_name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(CorrelationId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(header_name, value);
    }
    response
}
