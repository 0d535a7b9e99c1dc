//! OpenAI Responses → Claude response translation (§4.7.2).

use ccproxy_core::error::Result;
use ccproxy_core::transform::{ResponseCtx, ResponseTransformer as ResponseTransformerTrait};
use md5::{Digest, Md5};
use serde_json::{json, Value};

fn search_result_id(url: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    format!("search_{}", data_encoding::HEXLOWER.encode(&digest[..4]))
}

fn map_stop_reason(status: Option<&str>) -> &'static str {
    match status {
        Some("completed") => "end_turn",
        Some("failed") => "error",
        Some("cancelled") => "cancelled",
        Some("in_progress") => "incomplete",
        Some("requires_action") => "tool_use",
        _ => "end_turn",
    }
}

fn convert_message_item(item: &Value, out: &mut Vec<Value>) {
    let Some(parts) = item.get("content").and_then(Value::as_array) else { return };
    let mut thinking_text = String::new();
    let mut thinking_signature: Option<String> = None;
    let mut has_thinking = false;

    for part in parts {
        match part.get("type").and_then(Value::as_str) {
            Some("output_text") | Some("input_text") => {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    out.push(json!({"type": "text", "text": text}));
                }
            }
            Some("output_image") => {
                if let Some(url) = part.get("image_url").and_then(Value::as_str) {
                    out.push(json!({"type": "image", "source": {"type": "url", "url": url}}));
                }
            }
            Some("reasoning") => {
                has_thinking = true;
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    thinking_text.push_str(text);
                }
                if let Some(sig) = part.get("signature").and_then(Value::as_str) {
                    thinking_signature = Some(sig.to_string());
                }
            }
            Some("web_search_result") => {
                if let Some(url) = part.get("url").and_then(Value::as_str) {
                    let text = part.get("text").and_then(Value::as_str).unwrap_or_default();
                    out.push(json!({
                        "type": "web_search_tool_result",
                        "tool_use_id": search_result_id(url),
                        "content": [{"type": "text", "text": text, "url": url}],
                    }));
                }
            }
            other => {
                tracing::debug!(part_type = ?other, "dropping unknown responses content part");
            }
        }
    }

    if has_thinking {
        let mut block = json!({"type": "thinking", "thinking": thinking_text});
        if let Some(sig) = thinking_signature {
            block["signature"] = json!(sig);
        }
        out.insert(0, block);
    }

    if let Some(results) = item.get("results").and_then(Value::as_array) {
        for result in results {
            let Some(url) = result.get("url").and_then(Value::as_str) else { continue };
            let text = result.get("text").and_then(Value::as_str).unwrap_or_default();
            out.push(json!({
                "type": "web_search_tool_result",
                "tool_use_id": search_result_id(url),
                "content": [{"type": "text", "text": text, "url": url}],
            }));
        }
    }
}

fn convert_output_items(output: &[Value], out: &mut Vec<Value>) {
    for item in output {
        match item.get("type").and_then(Value::as_str) {
            Some("message") => convert_message_item(item, out),
            Some("function_call") => {
                let id = item.get("call_id").and_then(Value::as_str).unwrap_or_default();
                let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
                let arguments = item.get("arguments").and_then(Value::as_str).unwrap_or("{}");
                let input: Value = serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
                out.push(json!({"type": "tool_use", "id": id, "name": name, "input": input}));
            }
            Some("function_call_output") => {
                let id = item.get("call_id").and_then(Value::as_str).unwrap_or_default();
                let text = item.get("output").and_then(Value::as_str).unwrap_or_default();
                let mut block = json!({
                    "type": "tool_result",
                    "tool_use_id": id,
                    "content": [{"type": "text", "text": text}],
                });
                if let Some(is_error) = item.get("is_error") {
                    block["is_error"] = is_error.clone();
                }
                out.push(block);
            }
            other => {
                tracing::debug!(item_type = ?other, "dropping unknown responses output item");
            }
        }
    }
}

pub struct ResponseTransformer;

impl ResponseTransformerTrait for ResponseTransformer {
    fn name(&self) -> &str {
        "openai_responses::ResponseTransformer"
    }

    fn transform(&self, response: Value, _ctx: &ResponseCtx) -> Result<Value> {
        if let Some(error) = response.get("error") {
            return Ok(json!({
                "type": "error",
                "error": {
                    "type": error.get("type").and_then(Value::as_str).unwrap_or("api_error"),
                    "message": error.get("message").cloned().unwrap_or(Value::Null),
                    "code": error.get("code").cloned().unwrap_or(Value::Null),
                },
            }));
        }

        let empty = Vec::new();
        let output = response.get("output").and_then(Value::as_array).unwrap_or(&empty);
        let mut content = Vec::new();
        convert_output_items(output, &mut content);
        if content.is_empty() {
            content.push(json!({"type": "text", "text": ""}));
        }

        let status = response.get("status").and_then(Value::as_str);
        let usage = response.get("usage").cloned().unwrap_or_else(|| json!({}));

        let result = json!({
            "id": response.get("id").cloned().unwrap_or(Value::Null),
            "type": "message",
            "role": "assistant",
            "model": response.get("model").cloned().unwrap_or(Value::Null),
            "content": content,
            "stop_reason": map_stop_reason(status),
            "stop_sequence": Value::Null,
            "usage": {
                "input_tokens": usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
                "output_tokens": usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
                "total_tokens": usage.get("total_tokens").and_then(Value::as_u64).unwrap_or(0),
                "cache_creation_input_tokens": 0,
                "cache_read_input_tokens": usage.get("prompt_tokens_details").and_then(|d| d.get("cached_tokens")).and_then(Value::as_u64).unwrap_or(0),
                "reasoning_output_tokens": usage.get("output_tokens_details").and_then(|d| d.get("reasoning_tokens")).and_then(Value::as_u64).unwrap_or(0),
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
    fn message_output_becomes_text_block() {
        let response = json!({
            "id": "resp_1",
            "model": "gpt-4o",
            "status": "completed",
            "output": [{"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": "hi"}]}],
            "usage": {"input_tokens": 4, "output_tokens": 1},
        });
        let out = run(response);
        assert_eq!(out["content"][0]["type"], "text");
        assert_eq!(out["content"][0]["text"], "hi");
        assert_eq!(out["stop_reason"], "end_turn");
    }

    #[test]
    fn function_call_becomes_tool_use() {
        let response = json!({
            "status": "requires_action",
            "output": [{"type": "function_call", "name": "bash", "call_id": "call_1", "arguments": "{\"cmd\":\"ls\"}"}],
        });
        let out = run(response);
        assert_eq!(out["content"][0]["type"], "tool_use");
        assert_eq!(out["content"][0]["name"], "bash");
        assert_eq!(out["stop_reason"], "tool_use");
    }

    #[test]
    fn error_payload_surfaces_as_anthropic_error() {
        let response = json!({"error": {"type": "invalid_request_error", "message": "bad input"}});
        let out = run(response);
        assert_eq!(out["type"], "error");
        assert_eq!(out["error"]["message"], "bad input");
    }

    #[test]
    fn empty_output_yields_single_empty_text_block() {
        let response = json!({"status": "completed", "output": []});
        let out = run(response);
        assert_eq!(out["content"].as_array().unwrap().len(), 1);
        assert_eq!(out["content"][0]["text"], "");
    }
}
