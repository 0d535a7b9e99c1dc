//! Claude → OpenAI Chat Completions request translation (§4.6.1). Grounded
//! on `examples/original_source/app/services/transformers/claude/openai.py`'s
//! request-side converter.

use ccproxy_core::error::Result;
use ccproxy_core::transform::{RequestCtx, RequestTransformer};
use serde_json::{json, Map, Value};

/// `reasoning_effort` threshold table shared with the Responses translator (§4.7.1).
pub fn reasoning_effort_for(budget_tokens: u64) -> &'static str {
    if budget_tokens < 1024 {
        "low"
    } else if budget_tokens < 8192 {
        "medium"
    } else {
        "high"
    }
}

fn thinking_budget(payload: &Value) -> Option<u64> {
    let budget = payload.get("thinking")?.get("budget_tokens")?.as_u64()?;
    if budget > 0 {
        Some(budget)
    } else {
        None
    }
}

fn text_part(text: &str) -> Value {
    json!({"type": "text", "text": text})
}

fn image_part(block: &Value) -> Option<Value> {
    let source = block.get("source")?;
    if source.get("type").and_then(Value::as_str) != Some("base64") {
        return None;
    }
    let media_type = source.get("media_type").and_then(Value::as_str)?;
    let data = source.get("data").and_then(Value::as_str)?;
    Some(json!({"type": "image_url", "image_url": {"url": format!("data:{media_type};base64,{data}")}}))
}

fn tool_result_text(block: &Value) -> String {
    match block.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

struct PendingMessage {
    role: String,
    content_parts: Vec<Value>,
    tool_calls: Vec<Value>,
}

impl PendingMessage {
    fn new(role: &str) -> Self {
        Self { role: role.to_string(), content_parts: Vec::new(), tool_calls: Vec::new() }
    }

    fn is_empty(&self) -> bool {
        self.content_parts.is_empty() && self.tool_calls.is_empty()
    }

    fn flush(self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        let mut out = Map::new();
        out.insert("role".to_string(), Value::String(self.role));
        if self.content_parts.is_empty() {
            out.insert("content".to_string(), Value::Null);
        } else if self.content_parts.len() == 1 && self.content_parts[0].get("type").and_then(Value::as_str) == Some("text") {
            out.insert("content".to_string(), self.content_parts[0]["text"].clone());
        } else {
            out.insert("content".to_string(), Value::Array(self.content_parts));
        }
        if !self.tool_calls.is_empty() {
            out.insert("tool_calls".to_string(), Value::Array(self.tool_calls));
        }
        Some(Value::Object(out))
    }
}

fn convert_messages(payload: &Value) -> Vec<Value> {
    let mut out = Vec::new();

    if let Some(system_text) = join_system_text(payload) {
        out.push(json!({"role": "system", "content": system_text}));
    }

    let Some(messages) = payload.get("messages").and_then(Value::as_array) else {
        return out;
    };

    for message in messages {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
        let mut pending = PendingMessage::new(role);

        let blocks: Vec<Value> = match message.get("content") {
            Some(Value::String(s)) => vec![json!({"type": "text", "text": s})],
            Some(Value::Array(arr)) => arr.clone(),
            _ => Vec::new(),
        };

        for block in &blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        pending.content_parts.push(text_part(text));
                    }
                }
                Some("image") => {
                    if let Some(part) = image_part(block) {
                        pending.content_parts.push(part);
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    let arguments = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
                    pending.tool_calls.push(json!({
                        "id": id,
                        "type": "function",
                        "function": {"name": name, "arguments": arguments},
                    }));
                }
                Some("tool_result") => {
                    let flushed = std::mem::replace(&mut pending, PendingMessage::new(role));
                    if let Some(m) = flushed.flush() {
                        out.push(m);
                    }
                    let tool_call_id = block.get("tool_use_id").and_then(Value::as_str).unwrap_or_default();
                    out.push(json!({"role": "tool", "tool_call_id": tool_call_id, "content": tool_result_text(block)}));
                }
                _ => {}
            }
        }

        if let Some(m) = pending.flush() {
            out.push(m);
        }
    }

    out
}

fn join_system_text(payload: &Value) -> Option<String> {
    match payload.get("system")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => {
            let joined = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n");
            if joined.is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        _ => None,
    }
}

fn is_builtin_tool(tool: &Value) -> bool {
    tool.get("type").is_some() && tool.get("input_schema").is_none()
}

fn callable_tools(tools: &[Value]) -> Vec<Value> {
    tools
        .iter()
        .filter(|t| !is_builtin_tool(t))
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.get("name").cloned().unwrap_or(Value::Null),
                    "description": t.get("description").cloned().unwrap_or(Value::Null),
                    "parameters": t.get("input_schema").cloned().unwrap_or_else(|| json!({})),
                }
            })
        })
        .collect()
}

fn web_search_options(tool: &Value) -> Value {
    let mut filters = Map::new();
    if let Some(v) = tool.get("allowed_domains") {
        filters.insert("allowed_domains".to_string(), v.clone());
    }
    if let Some(v) = tool.get("blocked_domains") {
        filters.insert("blocked_domains".to_string(), v.clone());
    }

    let mut options = Map::new();
    if !filters.is_empty() {
        options.insert("filters".to_string(), Value::Object(filters));
    }
    if let Some(location) = tool.get("user_location") {
        options.insert(
            "user_location".to_string(),
            json!({"type": "approximate", "approximate": location}),
        );
    }
    let search_context_size = tool.get("search_context_size").and_then(Value::as_str).unwrap_or("medium");
    options.insert("search_context_size".to_string(), Value::String(search_context_size.to_string()));
    Value::Object(options)
}

pub struct RequestTransformer;

impl ccproxy_core::transform::RequestTransformer for RequestTransformer {
    fn name(&self) -> &str {
        "openai_chat::RequestTransformer"
    }

    fn transform(&self, request: Value, ctx: &mut RequestCtx) -> Result<Value> {
        let mut out = Map::new();

        if let Some(model) = request.get("model") {
            out.insert("model".to_string(), model.clone());
        }
        if let Some(temperature) = request.get("temperature") {
            out.insert("temperature".to_string(), temperature.clone());
        }
        let stream = request.get("stream").and_then(Value::as_bool).unwrap_or(false);
        out.insert("stream".to_string(), Value::Bool(stream));
        out.insert("store".to_string(), Value::Bool(false));

        if let Some(max_tokens) = request.get("max_tokens") {
            out.insert("max_completion_tokens".to_string(), max_tokens.clone());
        }

        if let Some(budget) = thinking_budget(&request) {
            out.insert("reasoning_effort".to_string(), Value::String(reasoning_effort_for(budget).to_string()));
        }

        if stream {
            out.insert("stream_options".to_string(), json!({"include_usage": true}));
        }

        out.insert("messages".to_string(), Value::Array(convert_messages(&request)));

        let tools = request.get("tools").and_then(Value::as_array).cloned().unwrap_or_default();
        let callable: Vec<Value> = callable_tools(&tools);
        let builtin: Vec<&Value> = tools.iter().filter(|t| is_builtin_tool(t)).collect();

        if !callable.is_empty() {
            out.insert("tools".to_string(), Value::Array(callable));
            if !builtin.is_empty() {
                tracing::warn!("request has both callable and built-in tools; skipping built-in web_search path");
            }
        } else if let Some(web_search) = builtin.iter().find(|t| t.get("name").and_then(Value::as_str) == Some("web_search")) {
            out.insert("web_search_options".to_string(), web_search_options(web_search));
            out.insert("model".to_string(), Value::String("gpt-4o-search-preview".to_string()));
        }

        let _ = ctx;
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
        ccproxy_core::transform::RequestTransformer::transform(&t, request, &mut ctx).unwrap()
    }

    #[test]
    fn basic_message_translates() {
        let request = json!({
            "model": "gpt-4o",
            "max_tokens": 1000,
            "stream": true,
            "messages": [{"role": "user", "content": "Hi"}],
        });
        let out = run(request);
        assert_eq!(out["model"], "gpt-4o");
        assert_eq!(out["store"], false);
        assert_eq!(out["stream"], true);
        assert_eq!(out["stream_options"]["include_usage"], true);
        assert_eq!(out["max_completion_tokens"], 1000);
        assert_eq!(out["messages"], json!([{"role": "user", "content": "Hi"}]));
    }

    #[test]
    fn reasoning_effort_threshold_table() {
        assert_eq!(reasoning_effort_for(500), "low");
        assert_eq!(reasoning_effort_for(2000), "medium");
        assert_eq!(reasoning_effort_for(10000), "high");
    }

    #[test]
    fn zero_thinking_budget_omits_reasoning_effort() {
        let request = json!({"messages": [], "thinking": {"budget_tokens": 0}});
        let out = run(request);
        assert!(out.get("reasoning_effort").is_none());
    }

    #[test]
    fn tool_use_and_text_combine_then_tool_result_starts_new_message() {
        let request = json!({
            "messages": [
                {"role": "assistant", "content": [
                    {"type": "text", "text": "let me check"},
                    {"type": "tool_use", "id": "call_1", "name": "bash", "input": {"cmd": "ls"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "call_1", "content": "file.txt"}
                ]}
            ]
        });
        let out = run(request);
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "assistant");
        assert!(messages[0]["tool_calls"][0]["function"]["name"] == "bash");
        assert_eq!(messages[1]["role"], "tool");
        assert_eq!(messages[1]["tool_call_id"], "call_1");
        assert_eq!(messages[1]["content"], "file.txt");
    }

    #[test]
    fn builtin_web_search_with_no_callable_tools_emits_options() {
        let request = json!({
            "messages": [],
            "tools": [{"type": "web_search_20250305", "name": "web_search", "allowed_domains": ["python.org"], "user_location": {"country": "US", "city": "SF"}}],
        });
        let out = run(request);
        assert!(out.get("tools").is_none());
        assert_eq!(out["web_search_options"]["filters"]["allowed_domains"], json!(["python.org"]));
        assert_eq!(out["web_search_options"]["user_location"]["type"], "approximate");
        assert_eq!(out["web_search_options"]["search_context_size"], "medium");
        assert_eq!(out["model"], "gpt-4o-search-preview");
    }

    #[test]
    fn callable_tools_convert_to_function_shape() {
        let request = json!({
            "messages": [],
            "tools": [{"name": "bash", "description": "run", "input_schema": {"type": "object"}}],
        });
        let out = run(request);
        assert_eq!(out["tools"][0]["type"], "function");
        assert_eq!(out["tools"][0]["function"]["name"], "bash");
    }
}
