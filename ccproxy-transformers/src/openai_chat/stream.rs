//! Chat Completions streaming → Anthropic SSE (§4.6.3). Each call to
//! `transform_chunk` receives the bytes of one already-demultiplexed SSE
//! `data:` payload (the edge handler splits the upstream byte stream into
//! discrete events via an `eventsource-stream`-style reader, using
//! `eventsource_stream::Event` for per-event framing, before handing
//! them to the chunk pipeline); the edge loop does not filter `[DONE]`
//! itself, so this transformer sees the literal `[DONE]` line and emits
//! `message_stop` for it directly, marking `state.message_stopped`.
//! `finalize` (called once the upstream stream ends, per
//! `edge.rs::run_messages`) guards its own closing `message_delta`/
//! `message_stop` pair on that flag, so a request that does see `[DONE]`
//! gets exactly one `message_stop`, not two.

use ccproxy_core::error::Result;
use ccproxy_core::transform::{StreamChunkTransformer, StreamCtx};
use ccproxy_core::types::{ExchangeStreamChunk, SseState};
use ccproxy_sse::state;
use serde_json::{json, Value};

fn map_stop_reason(finish_reason: Option<&str>) -> &'static str {
    match finish_reason {
        Some("stop") => "end_turn",
        Some("length") => "max_tokens",
        Some("content_filter") => "stop_sequence",
        Some("tool_calls") => "tool_use",
        _ => "end_turn",
    }
}

fn usage_json(usage: &Value) -> Value {
    json!({
        "input_tokens": usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
        "output_tokens": usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
        "cache_creation_input_tokens": 0,
        "cache_read_input_tokens": usage.get("prompt_tokens_details").and_then(|d| d.get("cached_tokens")).and_then(Value::as_u64).unwrap_or(0),
    })
}

pub struct StreamTransformer;

impl StreamChunkTransformer for StreamTransformer {
    fn name(&self) -> &str {
        "openai_chat::StreamTransformer"
    }

    fn transform_chunk(&self, raw_chunk: &[u8], state: &mut SseState, ctx: &StreamCtx) -> Result<Vec<ExchangeStreamChunk>> {
        let channel = ctx.exchange.channel;
        let text = String::from_utf8_lossy(raw_chunk);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        if trimmed == "[DONE]" {
            if state.message_stopped {
                return Ok(Vec::new());
            }
            state.message_stopped = true;
            return Ok(vec![state::message_stop(channel, &state.model)]);
        }

        let chunk: Value = serde_json::from_str(trimmed).map_err(|e| {
            ccproxy_core::error::ProxyError::transform("openai_chat::StreamTransformer", format!("invalid upstream chunk JSON: {e}"))
        })?;

        let mut out = Vec::new();
        let model = chunk.get("model").and_then(Value::as_str).unwrap_or(&state.model).to_string();
        if state.model.is_empty() {
            state.model = model.clone();
        }

        let choices = chunk.get("choices").and_then(Value::as_array);
        if choices.map(|c| c.is_empty()).unwrap_or(true) {
            if let Some(usage) = chunk.get("usage") {
                let stop_reason = state.stop_reason.clone().unwrap_or_else(|| "end_turn".to_string());
                out.push(state::message_delta(channel, &state.model, &stop_reason, usage_json(usage)));
                return Ok(out);
            }
            return Ok(out);
        }
        let choice = &choices.unwrap()[0];
        let delta = choice.get("delta").cloned().unwrap_or_else(|| json!({}));

        if delta.get("role").is_some() && !state.message_started {
            let message_id = chunk.get("id").and_then(Value::as_str).unwrap_or_default();
            let role = delta.get("role").and_then(Value::as_str).unwrap_or("assistant");
            if let Some(event) = state::start_message(state, channel, message_id, &model, role) {
                out.push(event);
            }
        }

        if let Some(content) = delta.get("content").and_then(Value::as_str) {
            if state.active_text_block.is_none() {
                let (_, event) = state::open_text_block(state, channel, &state.model.clone());
                out.push(event);
            }
            let index = state.active_text_block.expect("just opened");
            out.push(state::text_delta(channel, &state.model, index, content));
        }

        if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in tool_calls {
                if call.get("type").and_then(Value::as_str) == Some("function") {
                    if let Some(index) = state.active_text_block.take() {
                        out.push(state::close_block(channel, &state.model, index));
                    }
                    let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
                    let name = call.get("function").and_then(|f| f.get("name")).and_then(Value::as_str).unwrap_or_default();
                    let (_, event) = state::open_tool_block(state, channel, &state.model.clone(), id, name);
                    out.push(event);
                }
                if let Some(arguments) = call.get("function").and_then(|f| f.get("arguments")).and_then(Value::as_str) {
                    if let Some(index) = state.active_tool_block {
                        out.push(state::tool_input_delta(channel, &state.model, index, arguments));
                    }
                }
            }
        }

        if let Some(finish_reason) = choice.get("finish_reason").and_then(Value::as_str) {
            out.extend(state::close_active_blocks(state, channel, &state.model.clone()));
            state.stop_reason = Some(map_stop_reason(Some(finish_reason)).to_string());
        }

        Ok(out)
    }

    fn finalize(&self, state: &mut SseState, ctx: &StreamCtx) -> Result<Vec<ExchangeStreamChunk>> {
        let channel = ctx.exchange.channel;
        let mut out = state::close_active_blocks(state, channel, &state.model.clone());
        if state.message_started && !state.message_stopped {
            let stop_reason = state.stop_reason.clone().unwrap_or_else(|| "end_turn".to_string());
            out.push(state::message_delta(channel, &state.model, &stop_reason, json!({"input_tokens": 0, "output_tokens": 0})));
            out.push(state::message_stop(channel, &state.model));
            state.message_stopped = true;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccproxy_core::types::{Channel, ExchangeRequest, RoutingKey};
    use serde_json::json;

    fn ctx(exchange: &ExchangeRequest) -> StreamCtx {
        StreamCtx { original_request: &Value::Null, routing_key: RoutingKey::Default, exchange }
    }

    #[test]
    fn full_happy_path_produces_valid_grammar() {
        let t = StreamTransformer;
        let mut state = SseState::default();
        let exchange = ExchangeRequest::new(Channel::Claude, "m", json!({}), true);
        let c = ctx(&exchange);

        let mut events = Vec::new();
        events.extend(t.transform_chunk(br#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"delta":{"role":"assistant","content":""}}]}"#, &mut state, &c).unwrap());
        events.extend(t.transform_chunk(br#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"delta":{"content":"Hi"}}]}"#, &mut state, &c).unwrap());
        events.extend(t.transform_chunk(br#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"delta":{},"finish_reason":"stop"}]}"#, &mut state, &c).unwrap());
        events.extend(t.transform_chunk(br#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2}}"#, &mut state, &c).unwrap());
        events.extend(t.transform_chunk(b"[DONE]", &mut state, &c).unwrap());

        let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names[0], "message_start");
        assert_eq!(names[1], "content_block_start");
        assert_eq!(names[2], "content_block_delta");
        assert!(names.contains(&"content_block_stop"));
        assert!(names.contains(&"message_delta"));
        assert_eq!(*names.last().unwrap(), "message_stop");
    }

    /// Drives the pipeline exactly as `edge.rs::run_messages` does: every
    /// upstream chunk through `transform_chunk`, including a trailing
    /// `[DONE]`, then `finalize` unconditionally. The `[DONE]` branch and
    /// `finalize`'s closing sequence must never both fire.
    #[test]
    fn done_then_finalize_emits_exactly_one_stop_sequence() {
        let t = StreamTransformer;
        let mut state = SseState::default();
        let exchange = ExchangeRequest::new(Channel::Claude, "m", json!({}), true);
        let c = ctx(&exchange);

        let mut events = Vec::new();
        events.extend(t.transform_chunk(br#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"delta":{"role":"assistant","content":""}}]}"#, &mut state, &c).unwrap());
        events.extend(t.transform_chunk(br#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"delta":{"content":"Hi"}}]}"#, &mut state, &c).unwrap());
        events.extend(t.transform_chunk(br#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"delta":{},"finish_reason":"stop"}]}"#, &mut state, &c).unwrap());
        events.extend(t.transform_chunk(br#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2}}"#, &mut state, &c).unwrap());
        events.extend(t.transform_chunk(b"[DONE]", &mut state, &c).unwrap());
        events.extend(t.finalize(&mut state, &c).unwrap());

        let names: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names.iter().filter(|n| **n == "message_stop").count(), 1);
        assert_eq!(names.iter().filter(|n| **n == "message_delta").count(), 1);
        assert_eq!(*names.last().unwrap(), "message_stop");
    }

    #[test]
    fn tool_call_opens_and_streams_input_json() {
        let t = StreamTransformer;
        let mut state = SseState::default();
        let exchange = ExchangeRequest::new(Channel::Claude, "m", json!({}), true);
        let c = ctx(&exchange);

        t.transform_chunk(br#"{"id":"c1","model":"gpt-4o","choices":[{"delta":{"role":"assistant"}}]}"#, &mut state, &c).unwrap();
        let events = t
            .transform_chunk(br#"{"id":"c1","model":"gpt-4o","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"bash","arguments":""}}]}}]}"#, &mut state, &c)
            .unwrap();
        assert!(events.iter().any(|e| e.event == "content_block_start" && e.data["content_block"]["type"] == "tool_use"));

        let events = t
            .transform_chunk(br#"{"id":"c1","model":"gpt-4o","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"cmd\""}}]}}]}"#, &mut state, &c)
            .unwrap();
        assert!(events.iter().any(|e| e.data["delta"]["type"] == "input_json_delta"));
    }
}
