//! `/v1/messages` and `/v1/messages/count_tokens` handlers (§6.1): build an
//! `ExchangeRequest`, route it, execute it against the resolved provider,
//! and emit an Anthropic SSE sequence back to the client regardless of
//! whether the upstream call itself streamed (§1, §2's data-flow summary).
//!
//! Built as an `Sse<impl Stream<...>>` over an `async_stream::stream!`
//! generator, using `eventsource_stream`'s `Eventsource` extension trait
//! for demultiplexing upstream SSE bytes one event at a time.

use crate::app_state::AppState;
use crate::correlation::CorrelationId;
use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use ccproxy_core::descriptors::ProviderDescriptor;
use ccproxy_core::error::ProxyError;
use ccproxy_core::transform::StreamCtx;
use ccproxy_core::types::{Channel, ExchangeRequest, ExchangeStreamChunk, Operation, RequestContext, SseState};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error};

pub type SharedAppState = Arc<arc_swap::ArcSwap<AppState>>;

fn header_map_to_owned(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

/// Anthropic's `messages` operation maps to `Operation::Responses` on a
/// backend whose descriptor only exposes the Responses endpoint (§4.7);
/// every other backend type answers it as `Operation::Messages`.
fn primary_operation(descriptor: &ProviderDescriptor) -> Operation {
    if descriptor.supports_responses {
        Operation::Responses
    } else {
        Operation::Messages
    }
}

fn build_exchange(mut payload: serde_json::Value) -> ExchangeRequest {
    let model = payload.get("model").and_then(serde_json::Value::as_str).unwrap_or_default().to_string();
    let original_stream = payload.get("stream").and_then(serde_json::Value::as_bool).unwrap_or(false);
    if let Some(obj) = payload.as_object_mut() {
        obj.remove("stream");
    }
    ExchangeRequest::new(Channel::Claude, model, payload, original_stream)
}

/// Runs one `/v1/messages` exchange end to end and returns the Anthropic
/// SSE sequence to hand back to the client, whether or not the upstream
/// call itself streamed.
async fn run_messages(state: &AppState, payload: serde_json::Value, headers: &HeaderMap, correlation_id: &str) -> Result<Vec<ExchangeStreamChunk>, ProxyError> {
    let mut exchange = build_exchange(payload);
    let mut ctx = RequestContext::new(correlation_id.to_string(), exchange.model.clone());

    let routing = state.router.route(&mut exchange, &mut ctx)?;
    debug!(correlation_id = %correlation_id, routing_key = %routing.routing_key, provider = %routing.provider, resolved_model = %routing.resolved_model_id, "routed request");

    let client = state.client_for(&routing.provider)?;
    let descriptor = state.descriptors.get(client.backend_type);
    let original_headers = header_map_to_owned(headers);
    let operation = primary_operation(descriptor);
    let use_real_stream = exchange.original_stream && descriptor.supports_streaming;

    if !use_real_stream {
        let response = client.execute(operation, descriptor, &exchange, &original_headers, &routing.resolved_model_id, routing.routing_key).await?;
        let message_id = response.payload.get("id").and_then(serde_json::Value::as_str).unwrap_or_default().to_string();
        return Ok(ccproxy_sse::emit(exchange.channel, &message_id, &routing.resolved_model_id, &response.payload));
    }

    let (upstream, upstream_request) =
        client.execute_streaming(operation, descriptor, &exchange, &original_headers, &routing.resolved_model_id, routing.routing_key).await?;

    let stream_chain = client.stream_pipeline(exchange.channel).to_vec();
    let stream_exchange = exchange.copy_with(upstream_request.clone());
    let mut sse_state = SseState { model: routing.resolved_model_id.clone(), ..Default::default() };
    let mut out = Vec::new();

    let mut events = upstream.bytes_stream().eventsource();
    while let Some(event) = events.next().await {
        let event = event.map_err(|e| ProxyError::upstream(None, e.to_string()))?;
        let ctx = StreamCtx { original_request: &upstream_request, routing_key: routing.routing_key, exchange: &stream_exchange };
        for transformer in &stream_chain {
            if let Some(t) = transformer.as_stream() {
                let chunks = t.transform_chunk(event.data.as_bytes(), &mut sse_state, &ctx).map_err(|e| ProxyError::transform(t.name().to_string(), e.to_string()))?;
                out.extend(chunks);
            }
        }
    }

    let ctx = StreamCtx { original_request: &upstream_request, routing_key: routing.routing_key, exchange: &stream_exchange };
    for transformer in &stream_chain {
        if let Some(t) = transformer.as_stream() {
            let chunks = t.finalize(&mut sse_state, &ctx).map_err(|e| ProxyError::transform(t.name().to_string(), e.to_string()))?;
            out.extend(chunks);
        }
    }

    Ok(out)
}

/// Runs one `/v1/messages/count_tokens` exchange: always non-streaming,
/// answered as a plain JSON body rather than SSE.
async fn run_count_tokens(state: &AppState, payload: serde_json::Value, headers: &HeaderMap, correlation_id: &str) -> Result<serde_json::Value, ProxyError> {
    let mut exchange = build_exchange(payload);
    let mut ctx = RequestContext::new(correlation_id.to_string(), exchange.model.clone());

    let routing = state.router.route(&mut exchange, &mut ctx)?;
    let client = state.client_for(&routing.provider)?;
    let descriptor = state.descriptors.get(client.backend_type);
    let original_headers = header_map_to_owned(headers);

    let response = client
        .execute(Operation::CountTokens, descriptor, &exchange, &original_headers, &routing.resolved_model_id, routing.routing_key)
        .await?;
    Ok(response.payload)
}

pub async fn messages(State(state): State<SharedAppState>, Extension(CorrelationId(correlation_id)): Extension<CorrelationId>, headers: HeaderMap, body: Bytes) -> Response {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return crate::error_response::to_http_response(&ProxyError::config(format!("invalid request body: {e}")), &correlation_id),
    };

    let snapshot = state.load_full();
    match run_messages(&snapshot, payload, &headers, &correlation_id).await {
        Ok(chunks) => {
            let body_stream = async_stream::stream! {
                for chunk in chunks {
                    let event = Event::default().event(chunk.event).json_data(chunk.data).unwrap_or_else(|_| Event::default());
                    yield Ok::<Event, Infallible>(event);
                }
            };
            Sse::new(body_stream).into_response()
        }
        Err(err) => {
            error!(correlation_id = %correlation_id, error = %err, "request failed before first byte");
            crate::error_response::to_http_response(&err, &correlation_id)
        }
    }
}

pub async fn count_tokens(State(state): State<SharedAppState>, Extension(CorrelationId(correlation_id)): Extension<CorrelationId>, headers: HeaderMap, body: Bytes) -> Response {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return crate::error_response::to_http_response(&ProxyError::config(format!("invalid request body: {e}")), &correlation_id),
    };

    let snapshot = state.load_full();
    match run_count_tokens(&snapshot, payload, &headers, &correlation_id).await {
        Ok(data) => (axum::http::StatusCode::OK, axum::Json(data)).into_response(),
        Err(err) => {
            error!(correlation_id = %correlation_id, error = %err, "count_tokens failed");
            crate::error_response::to_http_response(&err, &correlation_id)
        }
    }
}
