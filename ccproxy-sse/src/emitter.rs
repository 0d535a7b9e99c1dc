//! Non-streaming → SSE emitter (§4.8): converts one complete Anthropic-shaped
//! response into the ordered Anthropic SSE event sequence. This is also the
//! target grammar every streaming wire-format transformer in
//! `ccproxy-transformers` must produce, chunk-for-chunk, from upstream bytes.

use crate::events::{chunk_chars, TEXT_CHUNK_CHARS, TOOL_INPUT_CHUNK_CHARS};
use ccproxy_core::types::{Channel, ExchangeStreamChunk};
use serde_json::{json, Value};

fn chunk(channel: Channel, model: &str, event: &str, data: Value, finished: bool) -> ExchangeStreamChunk {
    ExchangeStreamChunk {
        channel,
        model: model.to_string(),
        event: event.to_string(),
        data,
        finished,
    }
}

fn zero_usage() -> Value {
    json!({
        "input_tokens": 0,
        "output_tokens": 0,
        "cache_creation_input_tokens": 0,
        "cache_read_input_tokens": 0,
    })
}

/// Emit the full `message_start ... message_stop` sequence for a complete
/// Anthropic response (§4.8). `message_id` is generated by the caller (the
/// edge handler) so correlation ids and message ids can share a source of
/// randomness if desired; this crate does not generate ids itself.
pub fn emit(channel: Channel, message_id: &str, model: &str, response: &Value) -> Vec<ExchangeStreamChunk> {
    let mut out = Vec::new();

    let role = response.get("role").and_then(Value::as_str).unwrap_or("assistant");
    out.push(chunk(
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
                "stop_reason": Value::Null,
                "stop_sequence": Value::Null,
                "usage": zero_usage(),
            }
        }),
        false,
    ));

    let empty = Vec::new();
    let blocks = response.get("content").and_then(Value::as_array).unwrap_or(&empty);
    if blocks.is_empty() {
        emit_block(channel, model, 0, &json!({"type": "text", "text": ""}), &mut out);
    } else {
        for (index, block) in blocks.iter().enumerate() {
            emit_block(channel, model, index as u32, block, &mut out);
        }
    }

    let stop_reason = response.get("stop_reason").cloned().unwrap_or(Value::Null);
    let stop_sequence = response.get("stop_sequence").cloned().unwrap_or(Value::Null);
    let usage = response.get("usage").cloned().unwrap_or_else(zero_usage);
    out.push(chunk(
        channel,
        model,
        "message_delta",
        json!({
            "type": "message_delta",
            "delta": { "stop_reason": stop_reason, "stop_sequence": stop_sequence },
            "usage": usage,
        }),
        false,
    ));

    out.push(chunk(channel, model, "message_stop", json!({"type": "message_stop"}), true));

    out
}

fn block_stub(block: &Value) -> Value {
    match block.get("type").and_then(Value::as_str) {
        Some("text") => json!({"type": "text", "text": ""}),
        Some("thinking") => json!({"type": "thinking", "thinking": ""}),
        Some("tool_use") => json!({
            "type": "tool_use",
            "id": block.get("id").cloned().unwrap_or(Value::Null),
            "name": block.get("name").cloned().unwrap_or(Value::Null),
            "input": {},
        }),
        _ => block.clone(),
    }
}

fn emit_block(channel: Channel, model: &str, index: u32, block: &Value, out: &mut Vec<ExchangeStreamChunk>) {
    out.push(chunk(
        channel,
        model,
        "content_block_start",
        json!({"type": "content_block_start", "index": index, "content_block": block_stub(block)}),
        false,
    ));

    match block.get("type").and_then(Value::as_str) {
        Some("text") => {
            let text = block.get("text").and_then(Value::as_str).unwrap_or("");
            for piece in chunk_chars(text, TEXT_CHUNK_CHARS) {
                out.push(chunk(
                    channel,
                    model,
                    "content_block_delta",
                    json!({"type": "content_block_delta", "index": index, "delta": {"type": "text_delta", "text": piece}}),
                    false,
                ));
            }
        }
        Some("thinking") => {
            let text = block.get("thinking").and_then(Value::as_str).unwrap_or("");
            for piece in chunk_chars(text, TEXT_CHUNK_CHARS) {
                out.push(chunk(
                    channel,
                    model,
                    "content_block_delta",
                    json!({"type": "content_block_delta", "index": index, "delta": {"type": "thinking_delta", "thinking": piece}}),
                    false,
                ));
            }
            if let Some(signature) = block.get("signature").and_then(Value::as_str) {
                out.push(chunk(
                    channel,
                    model,
                    "content_block_delta",
                    json!({"type": "content_block_delta", "index": index, "delta": {"type": "signature_delta", "signature": signature}}),
                    false,
                ));
            }
        }
        Some("tool_use") => {
            let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
            let encoded = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
            for piece in chunk_chars(&encoded, TOOL_INPUT_CHUNK_CHARS) {
                out.push(chunk(
                    channel,
                    model,
                    "content_block_delta",
                    json!({"type": "content_block_delta", "index": index, "delta": {"type": "input_json_delta", "partial_json": piece}}),
                    false,
                ));
            }
        }
        _ => {}
    }

    out.push(chunk(
        channel,
        model,
        "content_block_stop",
        json!({"type": "content_block_stop", "index": index}),
        false,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_message_start_and_stop() {
        let response = json!({
            "role": "assistant",
            "content": [{"type": "text", "text": "hi"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 1},
        });
        let events = emit(Channel::Claude, "msg_1", "claude-3", &response);
        assert_eq!(events.iter().filter(|e| e.event == "message_start").count(), 1);
        assert_eq!(events.iter().filter(|e| e.event == "message_stop").count(), 1);
        assert!(events.last().unwrap().finished);
    }

    #[test]
    fn block_indices_are_monotonic_and_nested() {
        let response = json!({
            "content": [
                {"type": "text", "text": "a"},
                {"type": "tool_use", "id": "t1", "name": "bash", "input": {"cmd": "ls"}},
            ],
        });
        let events = emit(Channel::Claude, "msg_1", "m", &response);
        let starts: Vec<u64> = events
            .iter()
            .filter(|e| e.event == "content_block_start")
            .map(|e| e.data["index"].as_u64().unwrap())
            .collect();
        assert_eq!(starts, vec![0, 1]);

        let first_start = events.iter().position(|e| e.event == "content_block_start").unwrap();
        let first_stop = events.iter().position(|e| e.event == "content_block_stop").unwrap();
        let second_start = events.iter().rposition(|e| e.event == "content_block_start").unwrap();
        assert!(first_start < first_stop);
        assert!(first_stop < second_start);
    }

    #[test]
    fn empty_content_yields_single_empty_text_block() {
        let response = json!({});
        let events = emit(Channel::Claude, "msg_1", "m", &response);
        let start = events.iter().find(|e| e.event == "content_block_start").unwrap();
        assert_eq!(start.data["content_block"]["type"], "text");
        assert_eq!(start.data["content_block"]["text"], "");
    }

    #[test]
    fn tool_input_is_chunked_as_json_deltas() {
        let long_input = json!({"path": "a".repeat(150)});
        let response = json!({
            "content": [{"type": "tool_use", "id": "t1", "name": "bash", "input": long_input}],
        });
        let events = emit(Channel::Claude, "msg_1", "m", &response);
        let deltas: Vec<_> = events
            .iter()
            .filter(|e| e.event == "content_block_delta" && e.data["delta"]["type"] == "input_json_delta")
            .collect();
        assert!(deltas.len() >= 2);
        let reassembled: String = deltas.iter().map(|e| e.data["delta"]["partial_json"].as_str().unwrap()).collect();
        assert_eq!(reassembled, serde_json::to_string(&long_input).unwrap());
    }
}
