//! Claude → OpenAI Responses request translation (§4.7.1).

use crate::openai_chat::reasoning_effort_for;
use ccproxy_core::error::{ProxyError, Result};
use ccproxy_core::transform::{RequestCtx, RequestTransformer as RequestTransformerTrait};
use serde_json::{json, Map, Value};

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

fn clamp_scalar(out: &mut Map<String, Value>, request: &Value, key: &str, out_key: &str, min: f64, max: f64) {
    if let Some(v) = request.get(key).and_then(Value::as_f64) {
        out.insert(out_key.to_string(), json!(clamp(v, min, max)));
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

struct PendingMessageItem {
    role: String,
    parts: Vec<Value>,
}

impl PendingMessageItem {
    fn new(role: &str) -> Self {
        Self { role: role.to_string(), parts: Vec::new() }
    }

    fn flush(self) -> Option<Value> {
        if self.parts.is_empty() {
            None
        } else {
            Some(json!({"type": "message", "role": self.role, "content": self.parts}))
        }
    }
}

fn text_part(role: &str, text: &str) -> Value {
    let part_type = if role == "assistant" { "output_text" } else { "input_text" };
    json!({"type": part_type, "text": text})
}

fn image_part(block: &Value) -> Option<Value> {
    let source = block.get("source")?;
    if source.get("type").and_then(Value::as_str) != Some("base64") {
        return None;
    }
    let media_type = source.get("media_type").and_then(Value::as_str)?;
    let data = source.get("data").and_then(Value::as_str)?;
    Some(json!({"type": "input_image", "image_url": format!("data:{media_type};base64,{data}")}))
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

fn build_instructions_and_input(payload: &Value) -> (Option<String>, Vec<Value>) {
    let mut input = Vec::new();
    let mut instructions = None;

    if let Some(system) = payload.get("system") {
        match system {
            Value::String(s) => instructions = Some(s.clone()),
            Value::Array(blocks) => {
                let text_joined = blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n");
                if !text_joined.is_empty() {
                    instructions = Some(text_joined);
                }
                for block in blocks {
                    if block.get("type").and_then(Value::as_str) != Some("text") {
                        input.push(json!({"type": "message", "role": "system", "content": [block]}));
                    }
                }
            }
            _ => {}
        }
    }

    let Some(messages) = payload.get("messages").and_then(Value::as_array) else {
        return (instructions, input);
    };

    for message in messages {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
        let mut pending = PendingMessageItem::new(role);

        let blocks: Vec<Value> = match message.get("content") {
            Some(Value::String(s)) => vec![json!({"type": "text", "text": s})],
            Some(Value::Array(arr)) => arr.clone(),
            _ => Vec::new(),
        };

        for block in &blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        pending.parts.push(text_part(role, text));
                    }
                }
                Some("image") => {
                    if let Some(part) = image_part(block) {
                        pending.parts.push(part);
                    }
                }
                Some("thinking") => {
                    // dropped on the outbound side
                }
                Some("tool_use") => {
                    let flushed = std::mem::replace(&mut pending, PendingMessageItem::new(role));
                    if let Some(item) = flushed.flush() {
                        input.push(item);
                    }
                    let call_id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                    let arguments = serde_json::to_string(&block.get("input").cloned().unwrap_or_else(|| json!({}))).unwrap_or_else(|_| "{}".to_string());
                    input.push(json!({"type": "function_call", "name": name, "call_id": call_id, "arguments": arguments}));
                }
                Some("tool_result") => {
                    let flushed = std::mem::replace(&mut pending, PendingMessageItem::new(role));
                    if let Some(item) = flushed.flush() {
                        input.push(item);
                    }
                    let call_id = block.get("tool_use_id").and_then(Value::as_str).unwrap_or_default();
                    let mut item = json!({"type": "function_call_output", "call_id": call_id, "output": tool_result_text(block)});
                    if let Some(is_error) = block.get("is_error") {
                        item["is_error"] = is_error.clone();
                    }
                    input.push(item);
                }
                _ => {}
            }
        }

        if let Some(item) = pending.flush() {
            input.push(item);
        }
    }

    (instructions, input)
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
                "name": t.get("name").cloned().unwrap_or(Value::Null),
                "description": t.get("description").cloned().unwrap_or(Value::Null),
                "parameters": t.get("input_schema").cloned().unwrap_or_else(|| json!({})),
            })
        })
        .collect()
}

fn web_search_tool(tool: &Value) -> Result<Value> {
    if tool.get("allowed_domains").is_some() && tool.get("blocked_domains").is_some() {
        return Err(ProxyError::transform(
            "openai_responses::RequestTransformer",
            "web_search tool cannot set both allowed_domains and blocked_domains",
        ));
    }
    let mut filters = Map::new();
    if let Some(v) = tool.get("allowed_domains") {
        filters.insert("allowed_domains".to_string(), v.clone());
    }
    if let Some(v) = tool.get("blocked_domains") {
        filters.insert("blocked_domains".to_string(), v.clone());
    }
    let mut web_search = Map::new();
    if !filters.is_empty() {
        web_search.insert("filters".to_string(), Value::Object(filters));
    }
    if let Some(location) = tool.get("user_location") {
        web_search.insert("user_location".to_string(), json!({"type": "approximate", "approximate": location}));
    }
    let search_context_size = tool.get("search_context_size").and_then(Value::as_str).unwrap_or("medium");
    web_search.insert("search_context_size".to_string(), Value::String(search_context_size.to_string()));
    Ok(json!({"type": "web_search", "web_search": web_search}))
}

fn tool_choice(request: &Value, out: &mut Map<String, Value>) {
    match request.get("tool_choice") {
        None => {}
        Some(Value::String(s)) if s == "auto" => {
            out.insert("tool_choice".to_string(), json!("auto"));
            out.insert("parallel_tool_calls".to_string(), Value::Bool(true));
        }
        Some(Value::String(s)) if s == "none" => {
            out.insert("tool_choice".to_string(), json!({"type": "none"}));
            out.insert("parallel_tool_calls".to_string(), Value::Bool(false));
        }
        Some(v) => {
            if let Some(name) = v.get("name").and_then(Value::as_str) {
                out.insert("tool_choice".to_string(), json!({"type": "function", "function": {"name": name}}));
                out.insert("parallel_tool_calls".to_string(), Value::Bool(false));
            }
        }
    }
}

pub struct RequestTransformer;

impl RequestTransformerTrait for RequestTransformer {
    fn name(&self) -> &str {
        "openai_responses::RequestTransformer"
    }

    fn transform(&self, request: Value, ctx: &mut RequestCtx) -> Result<Value> {
        let mut out = Map::new();

        if let Some(model) = request.get("model") {
            out.insert("model".to_string(), model.clone());
        }
        out.insert("stream".to_string(), Value::Bool(false));
        out.insert("store".to_string(), Value::Bool(false));

        let (instructions, input) = build_instructions_and_input(&request);
        if let Some(instructions) = instructions {
            out.insert("instructions".to_string(), Value::String(instructions));
        }
        out.insert("input".to_string(), Value::Array(input));

        clamp_scalar(&mut out, &request, "temperature", "temperature", 0.0, 2.0);
        clamp_scalar(&mut out, &request, "top_p", "top_p", 0.0, 1.0);
        if let Some(top_k) = request.get("top_k").and_then(Value::as_f64) {
            out.insert("top_k".to_string(), json!(top_k.max(0.0)));
        }
        clamp_scalar(&mut out, &request, "presence_penalty", "presence_penalty", -2.0, 2.0);
        clamp_scalar(&mut out, &request, "frequency_penalty", "frequency_penalty", -2.0, 2.0);

        if let Some(max_tokens) = request.get("max_tokens") {
            out.insert("max_output_tokens".to_string(), max_tokens.clone());
        }

        if let Some(budget) = thinking_budget(&request) {
            out.insert("reasoning".to_string(), json!({"effort": reasoning_effort_for(budget)}));
        }

        let tools = request.get("tools").and_then(Value::as_array).cloned().unwrap_or_default();
        let callable: Vec<Value> = callable_tools(&tools);
        let builtin: Vec<&Value> = tools.iter().filter(|t| is_builtin_tool(t)).collect();

        let mut out_tools = callable;
        for tool in &builtin {
            if tool.get("name").and_then(Value::as_str) == Some("web_search") {
                out_tools.push(web_search_tool(tool)?);
            }
        }
        if !out_tools.is_empty() {
            out.insert("tools".to_string(), Value::Array(out_tools));
        }

        tool_choice(&request, &mut out);

        let mut metadata = request.get("metadata").and_then(Value::as_object).cloned().unwrap_or_default();
        metadata.entry("source".to_string()).or_insert_with(|| Value::String("cc-proxy".to_string()));
        out.insert("metadata".to_string(), Value::Object(metadata));

        if let Some(response_format) = request.get("response_format").and_then(Value::as_object) {
            let mut whitelisted = Map::new();
            for key in ["type", "json_schema", "strict"] {
                if let Some(v) = response_format.get(key) {
                    whitelisted.insert(key.to_string(), v.clone());
                }
            }
            out.insert("response_format".to_string(), Value::Object(whitelisted));
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
