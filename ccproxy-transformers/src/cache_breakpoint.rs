//! Cache-breakpoint optimiser (§4.10): places at most 4
//! `cache_control: {type: ephemeral}` markers on an outgoing Anthropic
//! request to maximise prompt-cache hits. Grounded on
//! `examples/original_source/app/services/transformers/anthropic.py`'s
//! `AnthropicCacheTransformer`.

use ccproxy_core::error::Result;
use ccproxy_core::transform::{RequestCtx, RequestTransformer};
use ccproxy_core::types::RoutingKey;
use serde_json::{json, Value};

const MAX_BREAKPOINTS: usize = 4;

pub struct CacheBreakpointOptimizer {
    max_tools_breakpoints: usize,
}

impl CacheBreakpointOptimizer {
    pub fn new(max_tools_breakpoints: usize) -> Self {
        Self { max_tools_breakpoints }
    }
}

impl Default for CacheBreakpointOptimizer {
    fn default() -> Self {
        Self::new(2)
    }
}

impl RequestTransformer for CacheBreakpointOptimizer {
    fn name(&self) -> &str {
        "CacheBreakpointOptimizer"
    }

    fn transform(&self, mut request: Value, ctx: &mut RequestCtx) -> Result<Value> {
        if ctx.routing_key == RoutingKey::Background {
            return Ok(request);
        }

        remove_cache_breakpoints(&mut request);

        let tools_used = reorder_and_cache_tools(&mut request, self.max_tools_breakpoints);
        let system_used = insert_system_breakpoint(&mut request, tools_used);
        insert_message_breakpoints(&mut request, tools_used + system_used);

        Ok(request)
    }
}

fn strip_cache_control(block: &mut Value) {
    if let Some(obj) = block.as_object_mut() {
        obj.remove("cache_control");
    }
}

fn remove_cache_breakpoints(request: &mut Value) {
    if let Some(system) = request.get_mut("system").and_then(Value::as_array_mut) {
        for block in system.iter_mut() {
            strip_cache_control(block);
        }
    }
    if let Some(tools) = request.get_mut("tools").and_then(Value::as_array_mut) {
        for tool in tools.iter_mut() {
            strip_cache_control(tool);
        }
    }
    if let Some(messages) = request.get_mut("messages").and_then(Value::as_array_mut) {
        for message in messages.iter_mut() {
            if let Some(content) = message.get_mut("content") {
                if let Some(blocks) = content.as_array_mut() {
                    for block in blocks.iter_mut() {
                        strip_cache_control(block);
                    }
                }
            }
        }
    }
}

/// Reorders `tools` (default tools first, `mcp__`-prefixed tools second)
/// and places up to `max_tools_breakpoints` markers every 20 tools,
/// falling back to a single marker on the last tool when fewer than 20.
fn reorder_and_cache_tools(request: &mut Value, max_tools_breakpoints: usize) -> usize {
    let Some(tools) = request.get("tools").and_then(Value::as_array).cloned() else {
        return 0;
    };
    if tools.is_empty() {
        return 0;
    }

    let (mut default_tools, mcp_tools): (Vec<Value>, Vec<Value>) = tools.into_iter().partition(|tool| {
        !tool.get("name").and_then(Value::as_str).unwrap_or("").starts_with("mcp__")
    });
    default_tools.extend(mcp_tools);
    let mut reordered = default_tools;
    let total = reordered.len();

    let mut used = 0usize;
    let mut i = 0;
    while i + 20 <= total {
        if used >= max_tools_breakpoints {
            break;
        }
        if let Some(obj) = reordered[i + 20 - 1].as_object_mut() {
            obj.insert("cache_control".to_string(), json!({"type": "ephemeral"}));
        }
        used += 1;
        i += 20;
    }

    if used == 0 {
        if let Some(last) = reordered.last_mut().and_then(Value::as_object_mut) {
            last.insert("cache_control".to_string(), json!({"type": "ephemeral"}));
        }
        used += 1;
    }

    if let Some(obj) = request.as_object_mut() {
        obj.insert("tools".to_string(), Value::Array(reordered));
    }
    used
}

/// Caches only the last system block, if budget remains.
fn insert_system_breakpoint(request: &mut Value, used_breakpoints: usize) -> usize {
    if used_breakpoints >= MAX_BREAKPOINTS {
        return 0;
    }
    let Some(system) = request.get_mut("system").and_then(Value::as_array_mut) else {
        return 0;
    };
    let Some(last) = system.last_mut() else {
        return 0;
    };
    if let Some(obj) = last.as_object_mut() {
        obj.insert("cache_control".to_string(), json!({"type": "ephemeral"}));
        return 1;
    }
    0
}

fn has_block_type(message: &Value, block_type: &str) -> bool {
    message
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| blocks.iter().any(|b| b.get("type").and_then(Value::as_str) == Some(block_type)))
        .unwrap_or(false)
}

fn is_tool_cluster_message(message: &Value) -> bool {
    has_block_type(message, "tool_use") || has_block_type(message, "tool_result")
}

fn identify_tool_clusters(messages: &[Value]) -> Vec<Vec<usize>> {
    let mut clusters = Vec::new();
    let mut current = Vec::new();
    for (i, message) in messages.iter().enumerate() {
        if is_tool_cluster_message(message) {
            current.push(i);
        } else if !current.is_empty() {
            clusters.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        clusters.push(current);
    }
    clusters
}

fn find_conversation_milestones(messages: &[Value]) -> Vec<usize> {
    let mut milestones = Vec::new();
    for (i, message) in messages.iter().enumerate() {
        let Some(blocks) = message.get("content").and_then(Value::as_array) else {
            continue;
        };
        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                if matches!(block.get("name").and_then(Value::as_str), Some("TodoWrite") | Some("MultiEdit") | Some("Write")) {
                    milestones.push(i);
                }
            }
        }
    }
    milestones
}

/// Places a breakpoint on the last non-thinking content block of `message`,
/// converting a bare string `content` into a one-element block list first.
fn add_breakpoint_to_message(message: &mut Value) -> bool {
    match message.get_mut("content") {
        Some(Value::Array(blocks)) => {
            if let Some(target) = blocks.iter_mut().rev().find(|b| b.get("type").and_then(Value::as_str) != Some("thinking")) {
                if let Some(obj) = target.as_object_mut() {
                    obj.insert("cache_control".to_string(), json!({"type": "ephemeral"}));
                    return true;
                }
            }
            false
        }
        Some(Value::String(text)) => {
            let block = json!({"type": "text", "text": text.clone(), "cache_control": {"type": "ephemeral"}});
            if let Some(obj) = message.as_object_mut() {
                obj.insert("content".to_string(), Value::Array(vec![block]));
            }
            true
        }
        _ => false,
    }
}

fn insert_message_breakpoints(request: &mut Value, used_breakpoints: usize) {
    let Some(messages) = request.get("messages").and_then(Value::as_array).cloned() else {
        return;
    };
    if messages.is_empty() || used_breakpoints >= MAX_BREAKPOINTS {
        return;
    }
    let available = MAX_BREAKPOINTS - used_breakpoints;
    let mut messages = messages;
    let mut used = 0usize;
    let last_index = messages.len() - 1;

    for cluster in identify_tool_clusters(&messages) {
        if used >= available {
            break;
        }
        let cluster_end = *cluster.last().unwrap();
        if cluster.len() >= 3 && cluster_end < last_index && add_breakpoint_to_message(&mut messages[cluster_end]) {
            used += 1;
        }
    }

    if used < available {
        for idx in find_conversation_milestones(&messages) {
            if used >= available {
                break;
            }
            if idx < last_index && add_breakpoint_to_message(&mut messages[idx]) {
                used += 1;
            }
        }
    }

    if used < available {
        let remaining = available - used;
        let mut content_count = 0usize;
        let mut added = 0usize;
        for message in messages[..last_index].iter_mut() {
            let blocks_in_message = match message.get("content") {
                Some(Value::String(_)) => 1,
                Some(Value::Array(blocks)) => blocks.iter().filter(|b| b.get("type").and_then(Value::as_str) != Some("thinking")).count(),
                _ => 0,
            };
            content_count += blocks_in_message;
            if content_count >= 20 && added < remaining {
                if add_breakpoint_to_message(message) {
                    added += 1;
                    content_count = 0;
                }
            }
        }
    }

    if let Some(obj) = request.as_object_mut() {
        obj.insert("messages".to_string(), Value::Array(messages));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccproxy_core::types::{Channel, ExchangeRequest};
    use std::collections::HashMap;

    fn run(request: Value, routing_key: RoutingKey) -> Value {
        let t = CacheBreakpointOptimizer::default();
        let mut headers = HashMap::new();
        let mut base_url = String::new();
        let original = request.clone();
        let exchange = ExchangeRequest::new(Channel::Claude, "m", request.clone(), false);
        let mut ctx = RequestCtx { headers: &mut headers, base_url: &mut base_url, original_request: &original, routing_key, exchange: &exchange };
        t.transform(request, &mut ctx).unwrap()
    }

    fn count_breakpoints(request: &Value) -> usize {
        let mut total = 0;
        if let Some(system) = request.get("system").and_then(Value::as_array) {
            total += system.iter().filter(|b| b.get("cache_control").is_some()).count();
        }
        if let Some(tools) = request.get("tools").and_then(Value::as_array) {
            total += tools.iter().filter(|t| t.get("cache_control").is_some()).count();
        }
        if let Some(messages) = request.get("messages").and_then(Value::as_array) {
            for message in messages {
                if let Some(blocks) = message.get("content").and_then(Value::as_array) {
                    total += blocks.iter().filter(|b| b.get("cache_control").is_some()).count();
                }
            }
        }
        total
    }

    #[test]
    fn background_routing_key_skips_entirely() {
        let request = json!({
            "system": [{"type": "text", "text": "a"}],
            "tools": [{"name": "bash"}],
        });
        let out = run(request.clone(), RoutingKey::Background);
        assert_eq!(out, request);
    }

    #[test]
    fn never_exceeds_four_breakpoints() {
        let mut tools = Vec::new();
        for i in 0..25 {
            tools.push(json!({"name": format!("tool{i}")}));
        }
        let mut messages = Vec::new();
        for i in 0..30 {
            messages.push(json!({"role": if i % 2 == 0 {"user"} else {"assistant"}, "content": format!("message {i}")}));
        }
        let request = json!({
            "system": [{"type": "text", "text": "sys1"}, {"type": "text", "text": "sys2"}],
            "tools": tools,
            "messages": messages,
        });
        let out = run(request, RoutingKey::Default);
        assert!(count_breakpoints(&out) <= MAX_BREAKPOINTS);
    }

    #[test]
    fn tools_are_reordered_default_first() {
        let request = json!({
            "tools": [{"name": "mcp__foo"}, {"name": "bash"}],
        });
        let out = run(request, RoutingKey::Default);
        assert_eq!(out["tools"][0]["name"], "bash");
        assert_eq!(out["tools"][1]["name"], "mcp__foo");
    }

    #[test]
    fn last_system_block_gets_breakpoint() {
        let request = json!({"system": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]});
        let out = run(request, RoutingKey::Default);
        assert!(out["system"][0].get("cache_control").is_none());
        assert!(out["system"][1].get("cache_control").is_some());
    }

    #[test]
    fn tool_cluster_of_three_gets_trailing_breakpoint() {
        let messages = vec![
            json!({"role": "user", "content": "start"}),
            json!({"role": "assistant", "content": [{"type": "tool_use", "name": "bash", "id": "1"}]}),
            json!({"role": "user", "content": [{"type": "tool_result", "tool_use_id": "1", "content": "ok"}]}),
            json!({"role": "assistant", "content": [{"type": "tool_use", "name": "bash", "id": "2"}]}),
            json!({"role": "user", "content": "final message"}),
        ];
        let request = json!({"messages": messages});
        let out = run(request, RoutingKey::Default);
        let msgs = out["messages"].as_array().unwrap();
        assert!(msgs[3]["content"][0].get("cache_control").is_some());
    }
}
