//! Core data model: channels, exchange envelopes, routing results and the
//! per-request context that threads through the pipeline.
//!
//! Request/response payloads are kept as [`serde_json::Value`] rather than a
//! fully typed Anthropic struct. The pipeline is a JSON-to-JSON translator by
//! nature (JSONPath patches, cache-breakpoint surgery, passthrough byte
//! equality) and a typed struct would either lose unknown fields or need a
//! `#[serde(flatten)]` escape hatch everywhere transformers touch it. Using
//! `Value` directly is the same choice the reference implementation made
//! with plain dicts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Closed set of client-edge protocol dialects. This crate implements
/// `Claude`; `Codex` is carried through the type system so the router's
/// alias-direct branch has somewhere to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Claude,
    Codex,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Claude => write!(f, "claude"),
            Self::Codex => write!(f, "codex"),
        }
    }
}

/// Closed set of upstream backend types. Selects a [`crate::descriptors::ProviderDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderBackendType {
    Anthropic,
    Openai,
    OpenaiResponses,
    Gemini,
}

impl fmt::Display for ProviderBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Anthropic => "anthropic",
            Self::Openai => "openai",
            Self::OpenaiResponses => "openai-responses",
            Self::Gemini => "gemini",
        };
        write!(f, "{s}")
    }
}

/// A named upstream endpoint this gateway can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Messages,
    CountTokens,
    Responses,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Messages => "messages",
            Self::CountTokens => "count_tokens",
            Self::Responses => "responses",
        };
        write!(f, "{s}")
    }
}

/// Pipeline stage a transformer config belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Request,
    Response,
    Stream,
}

/// Symbolic classification of a request, used to pick a configured model
/// alias out of [`crate::config::RoutingConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKey {
    Default,
    Background,
    Planning,
    Thinking,
    PlanAndThink,
    BuiltinTools,
    /// Not a RoutingConfig field: the `/model <alias>` agent marker short-circuits
    /// straight to an alias and never consults RoutingConfig.
    AgentDirect,
    /// Not a RoutingConfig field: a `model: "alias!"` suffix short-circuits to an
    /// alias and never consults RoutingConfig.
    Direct,
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::Background => "background",
            Self::Planning => "planning",
            Self::Thinking => "thinking",
            Self::PlanAndThink => "plan_and_think",
            Self::BuiltinTools => "builtin_tools",
            Self::AgentDirect => "agent_direct",
            Self::Direct => "direct",
        };
        write!(f, "{s}")
    }
}

/// One `{class_path, params}` transformer reference as it appears in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerRef {
    #[serde(rename = "class")]
    pub class_path: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// An inbound request, channel-tagged and carrying metadata the pipeline
/// accumulates as it runs (routing key, correlation id, ...).
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub channel: Channel,
    /// Model field as given by the client: an alias, a raw upstream model
    /// id, or an alias with a trailing `!` (direct-routing marker).
    pub model: String,
    /// Whether the *client* asked for a streaming response. Decoupled from
    /// whether the upstream call itself streams.
    pub original_stream: bool,
    /// Channel-native JSON payload (for `claude`, an Anthropic Messages body).
    pub payload: serde_json::Value,
    pub metadata: HashMap<String, String>,
    pub extras: HashMap<String, serde_json::Value>,
}

impl ExchangeRequest {
    pub fn new(channel: Channel, model: impl Into<String>, payload: serde_json::Value, stream: bool) -> Self {
        Self {
            channel,
            model: model.into(),
            original_stream: stream,
            payload,
            metadata: HashMap::new(),
            extras: HashMap::new(),
        }
    }

    /// Shallow-copy for non-destructive transformer steps that need to hand
    /// back a mutated sibling rather than mutate in place.
    pub fn copy_with(&self, payload: serde_json::Value) -> Self {
        Self {
            channel: self.channel,
            model: self.model.clone(),
            original_stream: self.original_stream,
            payload,
            metadata: self.metadata.clone(),
            extras: self.extras.clone(),
        }
    }

    pub fn routing_key(&self) -> Option<RoutingKey> {
        self.metadata.get("routing_key").and_then(|s| match s.as_str() {
            "default" => Some(RoutingKey::Default),
            "background" => Some(RoutingKey::Background),
            "planning" => Some(RoutingKey::Planning),
            "thinking" => Some(RoutingKey::Thinking),
            "plan_and_think" => Some(RoutingKey::PlanAndThink),
            "builtin_tools" => Some(RoutingKey::BuiltinTools),
            "agent_direct" => Some(RoutingKey::AgentDirect),
            "direct" => Some(RoutingKey::Direct),
            _ => None,
        })
    }
}

/// Result of the response pipeline: `payload` is always Anthropic-shaped by
/// the time an `ExchangeResponse` is constructed.
#[derive(Debug, Clone)]
pub struct ExchangeResponse {
    pub channel: Channel,
    pub model: String,
    pub payload: serde_json::Value,
    pub stream: bool,
    pub metadata: HashMap<String, String>,
}

/// One Anthropic SSE event in flight through the streaming pipeline.
#[derive(Debug, Clone)]
pub struct ExchangeStreamChunk {
    pub channel: Channel,
    pub model: String,
    pub event: String,
    pub data: serde_json::Value,
    pub finished: bool,
}

/// Outcome of [`crate::router::Router::route`].
#[derive(Debug, Clone)]
pub struct RoutingResult {
    pub provider: String,
    pub routing_key: RoutingKey,
    pub model_alias: Option<String>,
    pub resolved_model_id: String,
    pub channel: Channel,
    pub is_direct_routing: bool,
    pub is_agent_routing: bool,
    pub used_fallback: bool,
}

/// Per-request, logically process-scoped value populated by the router and
/// consumed by logging/dumping. Modeled as an explicit owned value threaded
/// through call arguments rather than thread-local/task-local ambient state
/// (see SPEC_FULL.md's note on context propagation).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub original_model: String,
    pub routing: Option<RoutingResult>,
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>, original_model: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            original_model: original_model.into(),
            routing: None,
        }
    }
}

/// Mutable state bag a streaming chunk transformer carries across
/// successive invocations for one request. Owned explicitly and passed by
/// `&mut` rather than hidden in transformer state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SseState {
    pub message_id: String,
    pub model: String,
    pub next_block_index: u32,
    pub active_text_block: Option<u32>,
    pub active_tool_block: Option<u32>,
    #[serde(default)]
    pub usage_tokens: serde_json::Map<String, serde_json::Value>,
    pub stop_reason: Option<String>,
    pub message_started: bool,
    /// Set once the closing `message_stop` has actually been emitted, so a
    /// caller that unconditionally runs `finalize` after an explicit
    /// terminator (e.g. OpenAI's `data: [DONE]`) doesn't emit it twice.
    #[serde(default)]
    pub message_stopped: bool,
    /// Gemini-only: maps a `candidates[0].content.parts` index to the
    /// Anthropic block index opened for it, since Gemini resends full
    /// per-part snapshots rather than incremental deltas (§11.3).
    #[serde(default)]
    pub gemini_part_blocks: HashMap<u32, u32>,
    /// Gemini-only: text already emitted for each part index, so a
    /// resent snapshot can be diffed down to its incremental suffix.
    #[serde(default)]
    pub gemini_part_text_seen: HashMap<u32, String>,
    /// Gemini-only: block indices opened for a text/thinking part that are
    /// still open, closed in bulk once `finishReason` appears (§11.3).
    #[serde(default)]
    pub gemini_open_blocks: Vec<u32>,
}
