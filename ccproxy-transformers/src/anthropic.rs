//! Anthropic pass-through transformers (§6.2: "defaults are empty
//! transformer chains" for the `anthropic` backend — kept here only for
//! the case a deployment explicitly configures an `AnthropicAuthTransformer`
//! override). Grounded on
//! `examples/original_source/app/services/transformers/anthropic.py`'s
//! `AnthropicAuthTransformer`/`AnthropicResponseTransformer`.

use ccproxy_core::error::Result;
use ccproxy_core::transform::{RequestCtx, RequestTransformer, ResponseCtx, ResponseTransformer};
use serde_json::Value;

const ALLOWED_PREFIXES: [&str; 3] = ["x-", "anthropic", "user-"];

pub struct AnthropicAuthTransformer {
    api_key: String,
}

impl AnthropicAuthTransformer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into() }
    }
}

impl RequestTransformer for AnthropicAuthTransformer {
    fn name(&self) -> &str {
        "AnthropicAuthTransformer"
    }

    fn transform(&self, request: Value, ctx: &mut RequestCtx) -> Result<Value> {
        ctx.headers.retain(|k, _| {
            let lower = k.to_lowercase();
            ALLOWED_PREFIXES.iter().any(|p| lower.starts_with(p))
        });
        ctx.headers.insert("authorization".to_string(), format!("Bearer {}", self.api_key));
        Ok(request)
    }
}

pub struct AnthropicResponseTransformer;

impl ResponseTransformer for AnthropicResponseTransformer {
    fn name(&self) -> &str {
        "AnthropicResponseTransformer"
    }

    fn transform(&self, response: Value, _ctx: &ResponseCtx) -> Result<Value> {
        Ok(response)
    }
}
