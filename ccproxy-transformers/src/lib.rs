//! Concrete transformer implementations registered into a
//! [`ConstructorRegistry`] at startup (§4.2, §9's closed-table design note).
//! `ccproxy-server`'s bootstrap is the only caller of [`register_all`].

pub mod anthropic;
pub mod cache_breakpoint;
pub mod gemini;
pub mod generic;
pub mod json_path;
pub mod openai_chat;
pub mod openai_responses;

use ccproxy_core::error::{ProxyError, Result};
use ccproxy_core::transform::LoadedTransformer;
use ccproxy_core::transformer_loader::ConstructorRegistry;
use generic::{AuthHeaderTransformer, AuthStyle, BodyOp, BodyPatch, HeaderOp, HeaderTransformer, RequestBodyTransformer, ToolDescriptionOptimizer, UrlPathTransformer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn param_str(params: &Map<String, Value>, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProxyError::config(format!("missing string param '{key}'")))
}

fn param_str_opt(params: &Map<String, Value>, key: &str, default: &str) -> String {
    params.get(key).and_then(Value::as_str).unwrap_or(default).to_string()
}

fn parse_header_ops(params: &Map<String, Value>) -> Result<Vec<HeaderOp>> {
    let entries = params
        .get("operations")
        .and_then(Value::as_array)
        .ok_or_else(|| ProxyError::config("HeaderTransformer requires an 'operations' array"))?;
    entries
        .iter()
        .map(|entry| {
            let key = param_str(entry.as_object().ok_or_else(|| ProxyError::config("operation entry must be an object"))?, "key")?;
            match entry.get("op").and_then(Value::as_str) {
                Some("set") => {
                    let value = entry.get("value").and_then(Value::as_str).unwrap_or_default().to_string();
                    Ok(HeaderOp::Set { key, value })
                }
                Some("delete") => Ok(HeaderOp::Delete { key }),
                other => Err(ProxyError::config(format!("unknown header operation '{other:?}'"))),
            }
        })
        .collect()
}

fn parse_body_patches(params: &Map<String, Value>) -> Result<Vec<BodyPatch>> {
    let entries = params
        .get("patches")
        .and_then(Value::as_array)
        .ok_or_else(|| ProxyError::config("RequestBodyTransformer requires a 'patches' array"))?;
    entries
        .iter()
        .map(|entry| {
            let obj = entry.as_object().ok_or_else(|| ProxyError::config("patch entry must be an object"))?;
            let key = param_str(obj, "key")?;
            let op = match obj.get("op").and_then(Value::as_str) {
                Some("set") => BodyOp::Set,
                Some("delete") => BodyOp::Delete,
                Some("append") => BodyOp::Append,
                Some("prepend") => BodyOp::Prepend,
                Some("merge") => BodyOp::Merge,
                other => return Err(ProxyError::config(format!("unknown body patch operation '{other:?}'"))),
            };
            let value = obj.get("value").cloned().unwrap_or(Value::Null);
            Ok(BodyPatch { key, op, value })
        })
        .collect()
}

fn parse_replacements(params: &Map<String, Value>) -> HashMap<String, String> {
    params
        .get("replacements")
        .and_then(Value::as_object)
        .map(|obj| obj.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_default()
}

/// Registers every transformer this crate provides under the class path
/// referenced by [`ccproxy_core::descriptors`] and by any `ccproxy-server`
/// config override. Call once at startup.
pub fn register_all(registry: &mut ConstructorRegistry) {
    registry.register("ccproxy_transformers::anthropic::AnthropicAuthTransformer", |params| {
        Ok(LoadedTransformer::Request(Arc::new(anthropic::AnthropicAuthTransformer::new(param_str_opt(params, "api_key", "")))))
    });
    registry.register("ccproxy_transformers::anthropic::AnthropicResponseTransformer", |_params| {
        Ok(LoadedTransformer::Response(Arc::new(anthropic::AnthropicResponseTransformer)))
    });

    registry.register("ccproxy_transformers::generic::HeaderTransformer", |params| {
        Ok(LoadedTransformer::Request(Arc::new(HeaderTransformer::new(parse_header_ops(params)?)?)))
    });
    registry.register("ccproxy_transformers::generic::UrlPathTransformer", |params| {
        Ok(LoadedTransformer::Request(Arc::new(UrlPathTransformer::new(param_str(params, "path")?))))
    });
    registry.register("ccproxy_transformers::generic::GeminiApiKeyTransformer", |params| {
        Ok(LoadedTransformer::Request(Arc::new(generic::GeminiApiKeyTransformer::new(param_str_opt(params, "api_key", "")))))
    });
    registry.register("ccproxy_transformers::generic::RequestBodyTransformer", |params| {
        Ok(LoadedTransformer::Request(Arc::new(RequestBodyTransformer::new(parse_body_patches(params)?)?)))
    });
    registry.register("ccproxy_transformers::generic::AuthHeaderTransformer", |params| {
        let style = match params.get("style").and_then(Value::as_str) {
            Some("bearer") => AuthStyle::BearerAuthorization,
            _ => AuthStyle::XApiKey,
        };
        let allowed_prefixes = params.get("allowed_prefixes").and_then(Value::as_array).map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect());
        Ok(LoadedTransformer::Request(Arc::new(AuthHeaderTransformer::new(param_str_opt(params, "api_key", ""), style, allowed_prefixes))))
    });
    registry.register("ccproxy_transformers::generic::ToolDescriptionOptimizer", |params| {
        Ok(LoadedTransformer::Request(Arc::new(ToolDescriptionOptimizer::new(parse_replacements(params)))))
    });

    registry.register("ccproxy_transformers::cache_breakpoint::CacheBreakpointOptimizer", |params| {
        let max_tools_breakpoints = params.get("max_tools_breakpoints").and_then(Value::as_u64).unwrap_or(2) as usize;
        Ok(LoadedTransformer::Request(Arc::new(cache_breakpoint::CacheBreakpointOptimizer::new(max_tools_breakpoints))))
    });

    registry.register("ccproxy_transformers::openai_chat::RequestTransformer", |_params| Ok(LoadedTransformer::Request(Arc::new(openai_chat::RequestTransformer))));
    registry.register("ccproxy_transformers::openai_chat::ResponseTransformer", |_params| Ok(LoadedTransformer::Response(Arc::new(openai_chat::ResponseTransformer))));
    registry.register("ccproxy_transformers::openai_chat::StreamTransformer", |_params| Ok(LoadedTransformer::Stream(Arc::new(openai_chat::StreamTransformer))));

    registry.register("ccproxy_transformers::openai_responses::RequestTransformer", |_params| Ok(LoadedTransformer::Request(Arc::new(openai_responses::RequestTransformer))));
    registry.register("ccproxy_transformers::openai_responses::ResponseTransformer", |_params| Ok(LoadedTransformer::Response(Arc::new(openai_responses::ResponseTransformer))));

    registry.register("ccproxy_transformers::gemini::RequestTransformer", |_params| Ok(LoadedTransformer::Request(Arc::new(gemini::RequestTransformer))));
    registry.register("ccproxy_transformers::gemini::ResponseTransformer", |_params| Ok(LoadedTransformer::Response(Arc::new(gemini::ResponseTransformer))));
    registry.register("ccproxy_transformers::gemini::StreamTransformer", |_params| Ok(LoadedTransformer::Stream(Arc::new(gemini::StreamTransformer))));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_all_covers_every_descriptor_class_path() {
        let mut registry = ConstructorRegistry::new();
        register_all(&mut registry);
        for class_path in [
            "ccproxy_transformers::openai_chat::RequestTransformer",
            "ccproxy_transformers::openai_chat::ResponseTransformer",
            "ccproxy_transformers::openai_chat::StreamTransformer",
            "ccproxy_transformers::openai_responses::RequestTransformer",
            "ccproxy_transformers::openai_responses::ResponseTransformer",
            "ccproxy_transformers::gemini::RequestTransformer",
            "ccproxy_transformers::gemini::ResponseTransformer",
            "ccproxy_transformers::gemini::StreamTransformer",
            "ccproxy_transformers::generic::GeminiApiKeyTransformer",
        ] {
            assert!(registry.contains(class_path), "missing {class_path}");
        }
    }
}
