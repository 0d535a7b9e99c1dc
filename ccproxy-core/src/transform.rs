//! Transformer trait seams (§4.5, §4.6-4.9). Concrete implementations live
//! in `ccproxy-transformers`; this crate only fixes the shapes so the
//! pipeline-execution code in `provider_client` can call through trait
//! objects without knowing which wire format it's talking to.

use crate::types::{ExchangeRequest, RoutingKey, SseState};
use serde_json::Value;
use std::collections::HashMap;

/// Mutable view a request transformer operates under. `base_url` is the
/// current call's owned copy (see SPEC_FULL.md's note on `base_url`
/// ownership) — mutating it only affects this request, never the shared
/// `ProviderConfig`.
pub struct RequestCtx<'a> {
    pub headers: &'a mut HashMap<String, String>,
    pub base_url: &'a mut String,
    pub original_request: &'a Value,
    pub routing_key: RoutingKey,
    pub exchange: &'a ExchangeRequest,
}

pub trait RequestTransformer: Send + Sync {
    fn name(&self) -> &str;
    fn transform(&self, request: Value, ctx: &mut RequestCtx) -> crate::error::Result<Value>;
}

pub struct ResponseCtx<'a> {
    pub request: &'a Value,
    pub final_headers: &'a HashMap<String, String>,
    pub original_request: &'a Value,
    pub routing_key: RoutingKey,
    pub exchange: &'a ExchangeRequest,
}

pub trait ResponseTransformer: Send + Sync {
    fn name(&self) -> &str;
    fn transform(&self, response: Value, ctx: &ResponseCtx) -> crate::error::Result<Value>;
}

pub struct StreamCtx<'a> {
    pub original_request: &'a Value,
    pub routing_key: RoutingKey,
    pub exchange: &'a ExchangeRequest,
}

/// Transforms one upstream chunk into zero or more Anthropic SSE events,
/// threading `state` across successive calls for the same request.
pub trait StreamChunkTransformer: Send + Sync {
    fn name(&self) -> &str;
    fn transform_chunk(
        &self,
        raw_chunk: &[u8],
        state: &mut SseState,
        ctx: &StreamCtx,
    ) -> crate::error::Result<Vec<crate::types::ExchangeStreamChunk>>;

    /// Called once after the upstream byte stream ends, to flush any
    /// pending block/message-stop events implied by `state`.
    fn finalize(&self, state: &mut SseState, ctx: &StreamCtx) -> crate::error::Result<Vec<crate::types::ExchangeStreamChunk>> {
        let _ = (state, ctx);
        Ok(Vec::new())
    }
}

use std::sync::Arc;

/// A loaded transformer, tagged by which stage it was constructed for.
#[derive(Clone)]
pub enum LoadedTransformer {
    Request(Arc<dyn RequestTransformer>),
    Response(Arc<dyn ResponseTransformer>),
    Stream(Arc<dyn StreamChunkTransformer>),
}

impl LoadedTransformer {
    pub fn as_request(&self) -> Option<&Arc<dyn RequestTransformer>> {
        match self {
            Self::Request(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&Arc<dyn ResponseTransformer>> {
        match self {
            Self::Response(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Arc<dyn StreamChunkTransformer>> {
        match self {
            Self::Stream(t) => Some(t),
            _ => None,
        }
    }
}
