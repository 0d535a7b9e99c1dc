//! Shared per-request streaming helpers built on top of
//! [`ccproxy_core::types::SseState`]. Every streaming wire-format transformer
//! (`ccproxy-transformers::openai_chat::StreamTransformer`,
//! `gemini::StreamTransformer`) drives the same Anthropic SSE event grammar
//! from different upstream framings; these helpers keep the block-index
//! bookkeeping and event shapes in one place so each transformer only has to
//! decide *when* to open/close/deliver a delta.

use ccproxy_core::types::{Channel, ExchangeStreamChunk, SseState};
use serde_json::json;

fn emit(channel: Channel, model: &str, event: &str, data: serde_json::Value, finished: bool) -> ExchangeStreamChunk {
    ExchangeStreamChunk { channel, model: model.to_string(), event: event.to_string(), data, finished }
}

/// Emits `message_start` the first time it's called for a request; a no-op
/// (returns `None`) on subsequent calls, tracked via `state.message_started`.
pub fn start_message(state: &mut SseState, channel: Channel, message_id: &str, model: &str, role: &str) -> Option<ExchangeStreamChunk> {
    if state.message_started {
        return None;
    }
    state.message_started = true;
    state.message_id = message_id.to_string();
    state.model = model.to_string();
    Some(emit(
        channel,
        model,
        "message_start",
        json!({
            "type": "message_start",
            "message": {
                "id": message_id,
                "type": "message",
                "role": role,
                "model": model,
                "content": [],
                "stop_reason": serde_json::Value::Null,
                "stop_sequence": serde_json::Value::Null,
                "usage": {"input_tokens": 0, "output_tokens": 0, "cache_creation_input_tokens": 0, "cache_read_input_tokens": 0},
            }
        }),
        false,
    ))
}

/// Opens a new text block at the next index, recording it as `active_text_block`.
pub fn open_text_block(state: &mut SseState, channel: Channel, model: &str) -> (u32, ExchangeStreamChunk) {
    let index = state.next_block_index;
    state.next_block_index += 1;
    state.active_text_block = Some(index);
    let event = emit(
        channel,
        model,
        "content_block_start",
        json!({"type": "content_block_start", "index": index, "content_block": {"type": "text", "text": ""}}),
        false,
    );
    (index, event)
}

/// Opens a new tool_use block at the next index, recording it as `active_tool_block`.
pub fn open_tool_block(state: &mut SseState, channel: Channel, model: &str, id: &str, name: &str) -> (u32, ExchangeStreamChunk) {
    let index = state.next_block_index;
    state.next_block_index += 1;
    state.active_tool_block = Some(index);
    let event = emit(
        channel,
        model,
        "content_block_start",
        json!({"type": "content_block_start", "index": index, "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}}}),
        false,
    );
    (index, event)
}

/// Opens a new thinking block at the next index. Thinking blocks don't get a
/// dedicated `active_*` slot in `SseState` since no wire format in this
/// workspace streams thinking incrementally alongside tool calls; callers
/// track the returned index themselves for the lifetime of the thinking run.
pub fn open_thinking_block(state: &mut SseState, channel: Channel, model: &str) -> (u32, ExchangeStreamChunk) {
    let index = state.next_block_index;
    state.next_block_index += 1;
    let event = emit(
        channel,
        model,
        "content_block_start",
        json!({"type": "content_block_start", "index": index, "content_block": {"type": "thinking", "thinking": ""}}),
        false,
    );
    (index, event)
}

pub fn text_delta(channel: Channel, model: &str, index: u32, text: &str) -> ExchangeStreamChunk {
    emit(
        channel,
        model,
        "content_block_delta",
        json!({"type": "content_block_delta", "index": index, "delta": {"type": "text_delta", "text": text}}),
        false,
    )
}

pub fn thinking_delta(channel: Channel, model: &str, index: u32, text: &str) -> ExchangeStreamChunk {
    emit(
        channel,
        model,
        "content_block_delta",
        json!({"type": "content_block_delta", "index": index, "delta": {"type": "thinking_delta", "thinking": text}}),
        false,
    )
}

pub fn signature_delta(channel: Channel, model: &str, index: u32, signature: &str) -> ExchangeStreamChunk {
    emit(
        channel,
        model,
        "content_block_delta",
        json!({"type": "content_block_delta", "index": index, "delta": {"type": "signature_delta", "signature": signature}}),
        false,
    )
}

pub fn tool_input_delta(channel: Channel, model: &str, index: u32, partial_json: &str) -> ExchangeStreamChunk {
    emit(
        channel,
        model,
        "content_block_delta",
        json!({"type": "content_block_delta", "index": index, "delta": {"type": "input_json_delta", "partial_json": partial_json}}),
        false,
    )
}

pub fn close_block(channel: Channel, model: &str, index: u32) -> ExchangeStreamChunk {
    emit(channel, model, "content_block_stop", json!({"type": "content_block_stop", "index": index}), false)
}

/// Closes whichever of `active_text_block`/`active_tool_block` is open,
/// clearing the slot. Returns both events if a caller contrives to have both
/// set (shouldn't happen per the pipeline's own invariant, but kept total).
pub fn close_active_blocks(state: &mut SseState, channel: Channel, model: &str) -> Vec<ExchangeStreamChunk> {
    let mut out = Vec::new();
    if let Some(index) = state.active_text_block.take() {
        out.push(close_block(channel, model, index));
    }
    if let Some(index) = state.active_tool_block.take() {
        out.push(close_block(channel, model, index));
    }
    out
}

pub fn message_delta(channel: Channel, model: &str, stop_reason: &str, usage: serde_json::Value) -> ExchangeStreamChunk {
    emit(
        channel,
        model,
        "message_delta",
        json!({"type": "message_delta", "delta": {"stop_reason": stop_reason, "stop_sequence": serde_json::Value::Null}, "usage": usage}),
        false,
    )
}

pub fn message_stop(channel: Channel, model: &str) -> ExchangeStreamChunk {
    emit(channel, model, "message_stop", json!({"type": "message_stop"}), true)
}
