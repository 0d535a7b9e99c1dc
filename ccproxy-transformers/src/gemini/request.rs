//! Claude → Gemini request translation (SPEC_FULL.md §11.1). Grounded on
//! `examples/original_source/app/services/transformers/gemini.py`'s
//! request-side converter.

use ccproxy_core::error::Result;
use ccproxy_core::transform::{RequestCtx, RequestTransformer as RequestTransformerTrait};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

fn system_instruction(payload: &Value) -> Option<Value> {
    let joined = match payload.get("system")? {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };
    if joined.is_empty() {
        None
    } else {
        Some(json!({"parts": [{"text": joined}]}))
    }
}

fn image_inline_data(block: &Value) -> Option<Value> {
    let source = block.get("source")?;
    if source.get("type").and_then(Value::as_str) != Some("base64") {
        return None;
    }
    let mime_type = source.get("media_type").and_then(Value::as_str)?;
    let data = source.get("data").and_then(Value::as_str)?;
    Some(json!({"inlineData": {"mimeType": mime_type, "data": data}}))
}

fn decode_tool_result_response(block: &Value) -> Value {
    let content = match block.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(v) if v.is_object() || v.is_array() => v,
        _ => Value::String(content),
    }
}

fn build_contents(payload: &Value) -> Vec<Value> {
    let mut contents = Vec::new();
    let mut call_id_to_name: HashMap<String, String> = HashMap::new();

    let Some(messages) = payload.get("messages").and_then(Value::as_array) else {
        return contents;
    };

    for message in messages {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
        let gemini_role = if role == "assistant" { "model" } else { "user" };

        let blocks: Vec<Value> = match message.get("content") {
            Some(Value::String(s)) => vec![json!({"type": "text", "text": s})],
            Some(Value::Array(arr)) => arr.clone(),
            _ => Vec::new(),
        };

        let mut parts = Vec::new();
        for block in &blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        parts.push(json!({"text": text}));
                    }
                }
                Some("image") => {
                    if let Some(inline) = image_inline_data(block) {
                        parts.push(inline);
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                    call_id_to_name.insert(id.to_string(), name.to_string());
                    let args = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    parts.push(json!({"functionCall": {"name": name, "args": args}}));
                }
                Some("tool_result") => {
                    let id = block.get("tool_use_id").and_then(Value::as_str).unwrap_or_default();
                    let name = call_id_to_name.get(id).cloned().unwrap_or_default();
                    let response_content = decode_tool_result_response(block);
                    parts.push(json!({"functionResponse": {"name": name, "response": {"content": response_content}}}));
                }
                _ => {}
            }
        }

        if !parts.is_empty() {
            contents.push(json!({"role": gemini_role, "parts": parts}));
        }
    }

    contents
}

fn function_declarations(tools: &[Value]) -> Option<Value> {
    let callable: Vec<Value> = tools
        .iter()
        .filter(|t| t.get("input_schema").is_some())
        .map(|t| {
            json!({
                "name": t.get("name").cloned().unwrap_or(Value::Null),
                "description": t.get("description").cloned().unwrap_or(Value::Null),
                "parameters": t.get("input_schema").cloned().unwrap_or_else(|| json!({})),
            })
        })
        .collect();
    if callable.is_empty() {
        None
    } else {
        Some(json!([{"functionDeclarations": callable}]))
    }
}

fn generation_config(request: &Value) -> Value {
    let mut config = Map::new();
    if let Some(v) = request.get("temperature") {
        config.insert("temperature".to_string(), v.clone());
    }
    if let Some(v) = request.get("top_p") {
        config.insert("topP".to_string(), v.clone());
    }
    if let Some(v) = request.get("top_k") {
        config.insert("topK".to_string(), v.clone());
    }
    if let Some(v) = request.get("max_tokens") {
        config.insert("maxOutputTokens".to_string(), v.clone());
    }
    if let Some(v) = request.get("stop_sequences") {
        config.insert("stopSequences".to_string(), v.clone());
    }
    let budget = request.get("thinking").and_then(|t| t.get("budget_tokens")).and_then(Value::as_u64).unwrap_or(0);
    if budget > 0 {
        config.insert("thinkingConfig".to_string(), json!({"thinkingBudget": budget, "includeThoughts": true}));
    }
    Value::Object(config)
}

pub struct RequestTransformer;

impl RequestTransformerTrait for RequestTransformer {
    fn name(&self) -> &str {
        "gemini::RequestTransformer"
    }

    fn transform(&self, request: Value, ctx: &mut RequestCtx) -> Result<Value> {
        let mut out = Map::new();

        if let Some(instruction) = system_instruction(&request) {
            out.insert("system_instruction".to_string(), instruction);
        }
        out.insert("contents".to_string(), Value::Array(build_contents(&request)));

        let tools = request.get("tools").and_then(Value::as_array).cloned().unwrap_or_default();
        if let Some(declarations) = function_declarations(&tools) {
            out.insert("tools".to_string(), declarations);
        }

        out.insert("generationConfig".to_string(), generation_config(&request));

        ctx.headers.retain(|k, _| k.eq_ignore_ascii_case("content-type"));
        ctx.headers.entry("Content-Type".to_string()).or_insert_with(|| "application/json".to_string());

        let mut value = Value::Object(out);
        strip_nulls(&mut value);
        Ok(value)
    }
}

fn strip_nulls(value: &mut Value) {
    if let Value::Object(map) = value {
        map.retain(|_, v| !v.is_null());
        for v in map.values_mut() {
            strip_nulls(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccproxy_core::types::{Channel, ExchangeRequest, RoutingKey};
    use std::collections::HashMap;

    fn run(request: Value) -> Value {
        let t = RequestTransformer;
        let mut headers = HashMap::new();
        let mut base_url = String::new();
        let original = request.clone();
        let exchange = ExchangeRequest::new(Channel::Claude, "m", request.clone(), false);
        let mut ctx = RequestCtx { headers: &mut headers, base_url: &mut base_url, original_request: &original, routing_key: RoutingKey::Default, exchange: &exchange };
        RequestTransformerTrait::transform(&t, request, &mut ctx).unwrap()
    }

    #[test]
    fn basic_message_translates() {
        let request = json!({
            "system": "be terse",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 256,
        });
        let out = run(request);
        assert_eq!(out["system_instruction"]["parts"][0]["text"], "be terse");
        assert_eq!(out["contents"][0]["role"], "user");
        assert_eq!(out["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(out["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn tool_use_and_result_recover_name_from_id_map() {
        let request = json!({
            "messages": [
                {"role": "assistant", "content": [{"type": "tool_use", "id": "call_1", "name": "bash", "input": {"cmd": "ls"}}]},
                {"role": "user", "content": [{"type": "tool_result", "tool_use_id": "call_1", "content": "a.txt\nb.txt"}]}
            ]
        });
        let out = run(request);
        let contents = out["contents"].as_array().unwrap();
        assert_eq!(contents[0]["role"], "model");
        assert_eq!(contents[0]["parts"][0]["functionCall"]["name"], "bash");
        assert_eq!(contents[1]["parts"][0]["functionResponse"]["name"], "bash");
        assert_eq!(contents[1]["parts"][0]["functionResponse"]["response"]["content"], "a.txt\nb.txt");
    }

    #[test]
    fn tools_group_under_single_function_declarations_entry() {
        let request = json!({
            "messages": [],
            "tools": [
                {"name": "bash", "description": "run", "input_schema": {"type": "object"}},
                {"name": "read", "description": "read", "input_schema": {"type": "object"}},
            ],
        });
        let out = run(request);
        let tools = out["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["functionDeclarations"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn thinking_budget_enables_thinking_config() {
        let request = json!({"messages": [], "thinking": {"budget_tokens": 4096}});
        let out = run(request);
        assert_eq!(out["generationConfig"]["thinkingConfig"]["thinkingBudget"], 4096);
        assert_eq!(out["generationConfig"]["thinkingConfig"]["includeThoughts"], true);
    }

    #[test]
    fn only_content_type_header_survives() {
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), "secret".to_string());
        headers.insert("authorization".to_string(), "Bearer secret".to_string());
        let mut base_url = String::new();
        let request = json!({"messages": []});
        let original = request.clone();
        let exchange = ExchangeRequest::new(Channel::Claude, "m", request.clone(), false);
        let mut ctx = RequestCtx { headers: &mut headers, base_url: &mut base_url, original_request: &original, routing_key: RoutingKey::Default, exchange: &exchange };
        RequestTransformerTrait::transform(&RequestTransformer, request, &mut ctx).unwrap();
        assert_eq!(ctx.headers.len(), 1);
        assert_eq!(ctx.headers.get("Content-Type").unwrap(), "application/json");
    }
}
