//! Gemini → Claude response translation, non-streaming (SPEC_FULL.md §11.2).

use ccproxy_core::error::Result;
use ccproxy_core::transform::{ResponseCtx, ResponseTransformer as ResponseTransformerTrait};
use md5::{Digest, Md5};
use serde_json::{json, Value};

/// `"toolu_" + md5(name + json(args))[:16]`, since Gemini assigns no call id.
pub fn synthetic_tool_call_id(name: &str, args: &Value) -> String {
    let canonical = serde_json::to_string(args).unwrap_or_default();
    let mut hasher = Md5::new();
    hasher.update(name.as_bytes());
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    format!("toolu_{}", data_encoding::HEXLOWER.encode(&digest[..8]))
}

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

pub fn convert_parts(parts: &[Value], out: &mut Vec<Value>) {
    for part in parts {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
                out.push(json!({"type": "thinking", "thinking": text}));
            } else {
                out.push(json!({"type": "text", "text": text}));
            }
            continue;
        }
        if let Some(call) = part.get("functionCall") {
            let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            let id = synthetic_tool_call_id(name, &args);
            out.push(json!({"type": "tool_use", "id": id, "name": name, "input": args}));
        }
    }
}

pub struct ResponseTransformer;

impl ResponseTransformerTrait for ResponseTransformer {
    fn name(&self) -> &str {
        "gemini::ResponseTransformer"
    }

    fn transform(&self, response: Value, _ctx: &ResponseCtx) -> Result<Value> {
        let candidate = response.get("candidates").and_then(Value::as_array).and_then(|c| c.first());
        let empty = Vec::new();
        let parts = candidate.and_then(|c| c.get("content")).and_then(|c| c.get("parts")).and_then(Value::as_array).unwrap_or(&empty);

        let mut content = Vec::new();
        convert_parts(parts, &mut content);
        if content.is_empty() {
            content.push(json!({"type": "text", "text": ""}));
        }

        let finish_reason = candidate.and_then(|c| c.get("finishReason")).and_then(Value::as_str);
        let usage = response.get("usageMetadata").cloned().unwrap_or_else(|| json!({}));

        let result = json!({
            "id": response.get("responseId").cloned().unwrap_or(Value::Null),
            "type": "message",
            "role": "assistant",
            "model": response.get("modelVersion").cloned().unwrap_or(Value::Null),
            "content": content,
            "stop_reason": map_stop_reason(finish_reason),
            "stop_sequence": Value::Null,
            "usage": {
                "input_tokens": usage.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0),
                "output_tokens": usage.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0),
                "cache_creation_input_tokens": 0,
                "cache_read_input_tokens": usage.get("cachedContentTokenCount").and_then(Value::as_u64).unwrap_or(0),
            },
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccproxy_core::types::{Channel, ExchangeRequest, RoutingKey};
    use std::collections::HashMap;

    fn run(response: Value) -> Value {
        let t = ResponseTransformer;
        let request = json!({});
        let headers = HashMap::new();
        let exchange = ExchangeRequest::new(Channel::Claude, "m", json!({}), false);
        let ctx = ResponseCtx { request: &request, final_headers: &headers, original_request: &request, routing_key: RoutingKey::Default, exchange: &exchange };
        ResponseTransformerTrait::transform(&t, response, &ctx).unwrap()
    }

    #[test]
    fn text_part_becomes_text_block() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "hi"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 2},
        });
        let out = run(response);
        assert_eq!(out["content"][0]["type"], "text");
        assert_eq!(out["content"][0]["text"], "hi");
        assert_eq!(out["stop_reason"], "end_turn");
        assert_eq!(out["usage"]["input_tokens"], 5);
    }

    #[test]
    fn thought_part_becomes_thinking_block() {
        let response = json!({"candidates": [{"content": {"parts": [{"text": "pondering", "thought": true}]}}]});
        let out = run(response);
        assert_eq!(out["content"][0]["type"], "thinking");
    }

    #[test]
    fn function_call_gets_synthetic_id() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"functionCall": {"name": "bash", "args": {"cmd": "ls"}}}]}, "finishReason": "STOP"}],
        });
        let out = run(response);
        assert_eq!(out["content"][0]["type"], "tool_use");
        let id = out["content"][0]["id"].as_str().unwrap();
        assert!(id.starts_with("toolu_"));
        assert_eq!(synthetic_tool_call_id("bash", &json!({"cmd": "ls"})), id);
    }

    #[test]
    fn empty_parts_yields_single_empty_text_block() {
        let response = json!({"candidates": [{"content": {"parts": []}}]});
        let out = run(response);
        assert_eq!(out["content"].as_array().unwrap().len(), 1);
        assert_eq!(out["content"][0]["text"], "");
    }
}
