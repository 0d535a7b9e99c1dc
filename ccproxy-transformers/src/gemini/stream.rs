//! Gemini streaming → Anthropic SSE (SPEC_FULL.md §11.3). Each `data:` line
//! carries a complete `GenerateContentResponse` snapshot rather than an
//! incremental delta, so this transformer diffs each part's text against
//! what it has already emitted for that part index.

use super::response::synthetic_tool_call_id;
use ccproxy_core::error::Result;
use ccproxy_core::transform::{StreamChunkTransformer, StreamCtx};
use ccproxy_core::types::{ExchangeStreamChunk, SseState};
use ccproxy_sse::state;
use serde_json::{json, Value};

fn map_stop_reason(finish_reason: Option<&str>) -> &'static str {
    match finish_reason {
        Some("STOP") => "end_turn",
        Some("MAX_TOKENS") => "max_tokens",
        Some("SAFETY") => "stop_sequence",
        Some("RECITATION") => "stop_sequence",
        Some("OTHER") => "end_turn",
        _ => "end_turn",
    }
}

fn usage_json(usage: &Value) -> Value {
    json!({
        "input_tokens": usage.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0),
        "output_tokens": usage.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0),
        "cache_creation_input_tokens": 0,
        "cache_read_input_tokens": usage.get("cachedContentTokenCount").and_then(Value::as_u64).unwrap_or(0),
    })
}

pub struct StreamTransformer;

impl StreamChunkTransformer for StreamTransformer {
    fn name(&self) -> &str {
        "gemini::StreamTransformer"
    }

    fn transform_chunk(&self, raw_chunk: &[u8], state: &mut SseState, ctx: &StreamCtx) -> Result<Vec<ExchangeStreamChunk>> {
        let channel = ctx.exchange.channel;
        let text = String::from_utf8_lossy(raw_chunk);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let chunk: Value = serde_json::from_str(trimmed).map_err(|e| {
            ccproxy_core::error::ProxyError::transform("gemini::StreamTransformer", format!("invalid upstream chunk JSON: {e}"))
        })?;

        let mut out = Vec::new();

        let model = chunk.get("modelVersion").and_then(Value::as_str).unwrap_or(&state.model).to_string();
        if !state.message_started {
            let message_id = chunk.get("responseId").and_then(Value::as_str).unwrap_or_default();
            if let Some(event) = state::start_message(state, channel, message_id, &model, "assistant") {
                out.push(event);
            }
        }

        let candidate = chunk.get("candidates").and_then(Value::as_array).and_then(|c| c.first());
        let empty = Vec::new();
        let parts = candidate.and_then(|c| c.get("content")).and_then(|c| c.get("parts")).and_then(Value::as_array).unwrap_or(&empty);

        for (index, part) in parts.iter().enumerate() {
            let part_index = index as u32;

            if let Some(text_val) = part.get("text").and_then(Value::as_str) {
                let is_thought = part.get("thought").and_then(Value::as_bool).unwrap_or(false);
                let block_index = if let Some(&idx) = state.gemini_part_blocks.get(&part_index) {
                    idx
                } else {
                    let (idx, event) = if is_thought {
                        state::open_thinking_block(state, channel, &state.model.clone())
                    } else {
                        state::open_text_block(state, channel, &state.model.clone())
                    };
                    state.gemini_part_blocks.insert(part_index, idx);
                    state.gemini_open_blocks.push(idx);
                    state.gemini_part_text_seen.insert(part_index, String::new());
                    out.push(event);
                    idx
                };

                let seen = state.gemini_part_text_seen.entry(part_index).or_default();
                let suffix = if let Some(rest) = text_val.strip_prefix(seen.as_str()) {
                    rest
                } else {
                    text_val
                };
                if !suffix.is_empty() {
                    let event = if is_thought {
                        state::thinking_delta(channel, &state.model, block_index, suffix)
                    } else {
                        state::text_delta(channel, &state.model, block_index, suffix)
                    };
                    out.push(event);
                }
                *seen = text_val.to_string();
                continue;
            }

            if let Some(call) = part.get("functionCall") {
                if state.gemini_part_blocks.contains_key(&part_index) {
                    continue;
                }
                let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
                let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
                let id = synthetic_tool_call_id(name, &args);
                let (block_index, start_event) = state::open_tool_block(state, channel, &state.model.clone(), &id, name);
                state.gemini_part_blocks.insert(part_index, block_index);
                out.push(start_event);
                let partial_json = serde_json::to_string(&args).unwrap_or_else(|_| "{}".to_string());
                out.push(state::tool_input_delta(channel, &state.model, block_index, &partial_json));
                out.push(state::close_block(channel, &state.model, block_index));
                state.active_tool_block = None;
            }
        }

        let finish_reason = candidate.and_then(|c| c.get("finishReason")).and_then(Value::as_str);
        if let Some(finish_reason) = finish_reason {
            for idx in state.gemini_open_blocks.drain(..) {
                out.push(state::close_block(channel, &state.model, idx));
            }
            let usage = chunk.get("usageMetadata").cloned().unwrap_or_else(|| json!({}));
            let stop_reason = map_stop_reason(Some(finish_reason)).to_string();
            out.push(state::message_delta(channel, &state.model, &stop_reason, usage_json(&usage)));
            out.push(state::message_stop(channel, &state.model));
            state.stop_reason = Some(stop_reason);
        }

        Ok(out)
    }

    fn finalize(&self, state: &mut SseState, ctx: &StreamCtx) -> Result<Vec<ExchangeStreamChunk>> {
        let channel = ctx.exchange.channel;
        let mut out = Vec::new();
        for idx in state.gemini_open_blocks.drain(..) {
            out.push(state::close_block(channel, &state.model, idx));
        }
        if state.message_started && state.stop_reason.is_none() {
            out.push(state::message_delta(channel, &state.model, "end_turn", json!({"input_tokens": 0, "output_tokens": 0})));
            out.push(state::message_stop(channel, &state.model));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccproxy_core::types::{Channel, ExchangeRequest, RoutingKey};

    fn ctx(exchange: &ExchangeRequest) -> StreamCtx {
        StreamCtx { original_request: &Value::Null, routing_key: RoutingKey::Default, exchange }
    }

    #[test]
    fn diffs_resent_text_snapshot_to_incremental_suffix() {
        let t = StreamTransformer;
        let mut state = SseState::default();
        let exchange = ExchangeRequest::new(Channel::Claude, "m", json!({}), true);
        let c = ctx(&exchange);

        let events = t
            .transform_chunk(br#"{"responseId":"r1","modelVersion":"gemini-2.0","candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#, &mut state, &c)
            .unwrap();
        assert!(events.iter().any(|e| e.event == "content_block_delta" && e.data["delta"]["text"] == "Hel"));

        let events = t
            .transform_chunk(br#"{"responseId":"r1","modelVersion":"gemini-2.0","candidates":[{"content":{"parts":[{"text":"Hello"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":2}}"#, &mut state, &c)
            .unwrap();
        assert!(events.iter().any(|e| e.event == "content_block_delta" && e.data["delta"]["text"] == "lo"));
        assert!(events.iter().any(|e| e.event == "message_stop"));
    }

    /// Drives the pipeline exactly as `edge.rs::run_messages` does: every
    /// upstream chunk through `transform_chunk`, then `finalize`
    /// unconditionally. `finishReason`'s own `message_delta`/`message_stop`
    /// and `finalize`'s closing-sequence fallback must never both fire.
    #[test]
    fn finish_reason_then_finalize_emits_exactly_one_stop_sequence() {
        let t = StreamTransformer;
        let mut state = SseState::default();
        let exchange = ExchangeRequest::new(Channel::Claude, "m", json!({}), true);
        let c = ctx(&exchange);

        let mut events = Vec::new();
        events.extend(
            t.transform_chunk(br#"{"responseId":"r1","modelVersion":"gemini-2.0","candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#, &mut state, &c)
                .unwrap(),
        );
        events.extend(
            t.transform_chunk(
                br#"{"responseId":"r1","modelVersion":"gemini-2.0","candidates":[{"content":{"parts":[{"text":"Hello"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":2}}"#,
                &mut state,
                &c,
            )
            .unwrap(),
        );
        events.extend(t.finalize(&mut state, &c).unwrap());

        let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names.iter().filter(|n| **n == "message_stop").count(), 1);
        assert_eq!(names.iter().filter(|n| **n == "message_delta").count(), 1);
        assert_eq!(*names.last().unwrap(), "message_stop");
    }

    #[test]
    fn function_call_part_opens_and_closes_in_one_step() {
        let t = StreamTransformer;
        let mut state = SseState::default();
        let exchange = ExchangeRequest::new(Channel::Claude, "m", json!({}), true);
        let c = ctx(&exchange);

        let events = t
            .transform_chunk(br#"{"responseId":"r1","candidates":[{"content":{"parts":[{"functionCall":{"name":"bash","args":{"cmd":"ls"}}}]}}]}"#, &mut state, &c)
            .unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
        assert!(names.contains(&"content_block_start"));
        assert!(names.contains(&"content_block_stop"));
    }
}
