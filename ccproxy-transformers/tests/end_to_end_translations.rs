//! Full request-then-response translation round trips, composing the
//! request-side and response-side transformers of one wire format together
//! rather than testing them in isolation. Covers spec.md §8's "End-to-end
//! scenarios" 1 (Chat Completions happy path) and 3 (built-in web_search).

use ccproxy_core::transform::{RequestCtx, RequestTransformer as _, ResponseCtx, ResponseTransformer as _};
use ccproxy_core::types::{Channel, ExchangeRequest, RoutingKey};
use ccproxy_transformers::{gemini, openai_chat};
use serde_json::json;
use std::collections::HashMap;

fn request_ctx<'a>(headers: &'a mut HashMap<String, String>, base_url: &'a mut String, original: &'a serde_json::Value, exchange: &'a ExchangeRequest) -> RequestCtx<'a> {
    RequestCtx { headers, base_url, original_request: original, routing_key: RoutingKey::Default, exchange }
}

#[test]
fn chat_completions_happy_path_round_trips_request_and_response() {
    let claude_request = json!({
        "model": "gpt-4o",
        "messages": [{"role": "user", "content": "Hi"}],
        "max_tokens": 1000,
        "stream": true,
    });

    let mut headers = HashMap::new();
    let mut base_url = String::new();
    let exchange = ExchangeRequest::new(Channel::Claude, "gpt-4o", claude_request.clone(), true);
    let mut ctx = request_ctx(&mut headers, &mut base_url, &claude_request, &exchange);

    let upstream_request = openai_chat::RequestTransformer.transform(claude_request, &mut ctx).unwrap();
    assert_eq!(upstream_request["model"], "gpt-4o");
    assert_eq!(upstream_request["store"], false);
    assert_eq!(upstream_request["stream"], true);
    assert_eq!(upstream_request["max_completion_tokens"], 1000);
    assert_eq!(upstream_request["messages"], json!([{"role": "user", "content": "Hi"}]));

    let upstream_response = json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o",
        "choices": [{"message": {"role": "assistant", "content": "Hello there"}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 8, "completion_tokens": 2},
    });
    let empty_headers = HashMap::new();
    let response_ctx = ResponseCtx { request: &upstream_request, final_headers: &empty_headers, original_request: &upstream_request, routing_key: RoutingKey::Default, exchange: &exchange };
    let claude_response = openai_chat::ResponseTransformer.transform(upstream_response, &response_ctx).unwrap();

    assert_eq!(claude_response["type"], "message");
    assert_eq!(claude_response["content"][0]["type"], "text");
    assert_eq!(claude_response["content"][0]["text"], "Hello there");
    assert_eq!(claude_response["stop_reason"], "end_turn");
    assert_eq!(claude_response["usage"]["input_tokens"], 8);
    assert_eq!(claude_response["usage"]["output_tokens"], 2);
}

#[test]
fn builtin_web_search_drops_tools_key_and_overrides_model() {
    let claude_request = json!({
        "model": "gpt-4o",
        "messages": [{"role": "user", "content": "latest python release?"}],
        "tools": [{"type": "web_search_20250305", "name": "web_search", "allowed_domains": ["python.org"], "user_location": {"country": "US", "city": "SF"}}],
    });

    let mut headers = HashMap::new();
    let mut base_url = String::new();
    let exchange = ExchangeRequest::new(Channel::Claude, "gpt-4o", claude_request.clone(), false);
    let mut ctx = request_ctx(&mut headers, &mut base_url, &claude_request, &exchange);

    let upstream_request = openai_chat::RequestTransformer.transform(claude_request, &mut ctx).unwrap();
    assert!(upstream_request.get("tools").is_none());
    assert_eq!(upstream_request["web_search_options"]["filters"]["allowed_domains"], json!(["python.org"]));
    assert_eq!(upstream_request["web_search_options"]["search_context_size"], "medium");
    assert_eq!(upstream_request["model"], "gpt-4o-search-preview");
}

#[test]
fn gemini_tool_use_round_trips_through_request_and_response() {
    let claude_request = json!({
        "model": "gemini-1.5-flash",
        "messages": [
            {"role": "user", "content": "list files"},
            {"role": "assistant", "content": [{"type": "tool_use", "id": "toolu_abc", "name": "bash", "input": {"cmd": "ls"}}]},
            {"role": "user", "content": [{"type": "tool_result", "tool_use_id": "toolu_abc", "content": "a.txt"}]},
        ],
    });

    let mut headers = HashMap::new();
    let mut base_url = "https://generativelanguage.googleapis.com".to_string();
    let exchange = ExchangeRequest::new(Channel::Claude, "gemini-1.5-flash", claude_request.clone(), false);
    let mut ctx = request_ctx(&mut headers, &mut base_url, &claude_request, &exchange);

    let upstream_request = gemini::RequestTransformer.transform(claude_request, &mut ctx).unwrap();
    let contents = upstream_request["contents"].as_array().unwrap();
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "bash");
    assert_eq!(contents[2]["parts"][0]["functionResponse"]["name"], "bash");
    assert_eq!(headers.get("content-type").map(String::as_str), Some("application/json"));

    let upstream_response = json!({
        "responseId": "r1",
        "modelVersion": "gemini-1.5-flash",
        "candidates": [{"content": {"parts": [{"functionCall": {"name": "bash", "args": {"cmd": "ls -la"}}}]}, "finishReason": "STOP"}],
        "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4},
    });
    let empty_headers = HashMap::new();
    let response_ctx = ResponseCtx { request: &upstream_request, final_headers: &empty_headers, original_request: &upstream_request, routing_key: RoutingKey::Default, exchange: &exchange };
    let claude_response = gemini::ResponseTransformer.transform(upstream_response, &response_ctx).unwrap();

    assert_eq!(claude_response["content"][0]["type"], "tool_use");
    assert_eq!(claude_response["content"][0]["name"], "bash");
    assert_eq!(claude_response["content"][0]["input"]["cmd"], "ls -la");
    assert_eq!(claude_response["stop_reason"], "end_turn");
}
