//! OpenAI Chat Completions → Claude response translation, non-streaming
//! (§4.6.2).

use ccproxy_core::error::Result;
use ccproxy_core::transform::{ResponseCtx, ResponseTransformer};
use md5::{Digest, Md5};
use serde_json::{json, Value};

fn citation_id(url: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    format!("search_{}", data_encoding::HEXLOWER.encode(&digest[..4]))
}

fn map_stop_reason(finish_reason: Option<&str>) -> &'static str {
    match finish_reason {
        Some("stop") => "end_turn",
        Some("length") => "max_tokens",
        Some("content_filter") => "stop_sequence",
        Some("tool_calls") => "tool_use",
        _ => "end_turn",
    }
}

fn convert_content_parts(message: &Value, out: &mut Vec<Value>) {
    if let Some(reasoning) = message.get("reasoning").and_then(Value::as_str) {
        let mut thinking_block = json!({"type": "thinking", "thinking": reasoning});
        if let Some(signature) = message.get("reasoning_signature").and_then(Value::as_str) {
            thinking_block["signature"] = json!(signature);
        }
        out.push(thinking_block);
    }

    match message.get("content") {
        Some(Value::String(text)) if !text.is_empty() => out.push(json!({"type": "text", "text": text})),
        Some(Value::Array(parts)) => {
            for part in parts {
                match part.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = part.get("text").and_then(Value::as_str) {
                            out.push(json!({"type": "text", "text": text}));
                        }
                    }
                    Some("image_url") => {
                        if let Some(url) = part.get("image_url").and_then(|u| u.get("url")).and_then(Value::as_str) {
                            out.push(json!({"type": "image", "source": {"type": "url", "url": url}}));
                        }
                    }
                    other => {
                        tracing::debug!(part_type = ?other, "dropping unknown chat-completions content part");
                    }
                }
            }
        }
        _ => {}
    }

    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in tool_calls {
            if call.get("type").and_then(Value::as_str) != Some("function") {
                continue;
            }
            let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
            let name = call.get("function").and_then(|f| f.get("name")).and_then(Value::as_str).unwrap_or_default();
            let arguments = call.get("function").and_then(|f| f.get("arguments")).and_then(Value::as_str).unwrap_or("{}");
            let input: Value = serde_json::from_str(arguments).unwrap_or_else(|_| json!({}));
            out.push(json!({"type": "tool_use", "id": id, "name": name, "input": input}));
        }
    }
}

fn append_citations(message: &Value, content: &str, out: &mut Vec<Value>) {
    let Some(annotations) = message.get("annotations").and_then(Value::as_array) else {
        return;
    };
    for annotation in annotations {
        if annotation.get("type").and_then(Value::as_str) != Some("url_citation") {
            continue;
        }
        let Some(citation) = annotation.get("url_citation") else { continue };
        let Some(url) = citation.get("url").and_then(Value::as_str) else { continue };
        let start = citation.get("start_index").and_then(Value::as_u64).unwrap_or(0) as usize;
        let end = citation.get("end_index").and_then(Value::as_u64).unwrap_or(0) as usize;
        let snippet: String = content.chars().skip(start).take(end.saturating_sub(start)).collect();
        out.push(json!({
            "type": "web_search_tool_result",
            "tool_use_id": citation_id(url),
            "content": [{"type": "text", "text": snippet, "url": url}],
        }));
    }
}

pub struct ResponseTransformer;

impl ccproxy_core::transform::ResponseTransformer for ResponseTransformer {
    fn name(&self) -> &str {
        "openai_chat::ResponseTransformer"
    }

    fn transform(&self, response: Value, _ctx: &ResponseCtx) -> Result<Value> {
        let choice = response.get("choices").and_then(Value::as_array).and_then(|c| c.first());
        let message = choice.and_then(|c| c.get("message")).cloned().unwrap_or_else(|| json!({}));

        let mut content = Vec::new();
        convert_content_parts(&message, &mut content);
        if content.is_empty() {
            content.push(json!({"type": "text", "text": ""}));
        }

        let full_text: String = content
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");
        append_citations(&message, &full_text, &mut content);

        let finish_reason = choice.and_then(|c| c.get("finish_reason")).and_then(Value::as_str);
        let usage = response.get("usage").cloned().unwrap_or_else(|| json!({}));

        let result = json!({
            "id": response.get("id").cloned().unwrap_or(Value::Null),
            "type": "message",
            "role": "assistant",
            "model": response.get("model").cloned().unwrap_or(Value::Null),
            "content": content,
            "stop_reason": map_stop_reason(finish_reason),
            "stop_sequence": Value::Null,
            "usage": {
                "input_tokens": usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
                "output_tokens": usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
                "cache_creation_input_tokens": 0,
                "cache_read_input_tokens": usage.get("prompt_tokens_details").and_then(|d| d.get("cached_tokens")).and_then(Value::as_u64).unwrap_or(0),
                "reasoning_output_tokens": usage.get("completion_tokens_details").and_then(|d| d.get("reasoning_tokens")).and_then(Value::as_u64).unwrap_or(0),
            },
        });
        Ok(result)
    }
}
