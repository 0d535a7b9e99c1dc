//! Generic utility transformers (§4.9), reusable across backend types.

use crate::json_path::{self, validate_path};
use ccproxy_core::error::{ProxyError, Result};
use ccproxy_core::transform::{RequestCtx, RequestTransformer};
use serde_json::Value;

/// One `{key, op, value?, prefix?, suffix?}` header mutation.
#[derive(Debug, Clone)]
pub enum HeaderOp {
    Set { key: String, value: String },
    Delete { key: String },
}

pub struct HeaderTransformer {
    operations: Vec<HeaderOp>,
}

impl HeaderTransformer {
    pub fn new(operations: Vec<HeaderOp>) -> Result<Self> {
        if operations.is_empty() {
            return Err(ProxyError::config("HeaderTransformer requires at least one operation"));
        }
        Ok(Self { operations })
    }
}

impl RequestTransformer for HeaderTransformer {
    fn name(&self) -> &str {
        "HeaderTransformer"
    }

    fn transform(&self, request: Value, ctx: &mut RequestCtx) -> Result<Value> {
        for op in &self.operations {
            match op {
                HeaderOp::Set { key, value } => {
                    ctx.headers.insert(key.clone(), value.clone());
                }
                HeaderOp::Delete { key } => {
                    ctx.headers.remove(key);
                }
            }
        }
        Ok(request)
    }
}

/// Appends a fixed path to `base_url` after stripping trailing slashes.
pub struct UrlPathTransformer {
    path: String,
}

impl UrlPathTransformer {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl RequestTransformer for UrlPathTransformer {
    fn name(&self) -> &str {
        "UrlPathTransformer"
    }

    fn transform(&self, request: Value, ctx: &mut RequestCtx) -> Result<Value> {
        let trimmed = ctx.base_url.trim_end_matches('/');
        *ctx.base_url = format!("{trimmed}{}", self.path);
        Ok(request)
    }
}

/// Resolves the Gemini API key (provider config, then `Authorization:
/// Bearer ...`, then `x-goog-api-key`, in that priority order) and moves it
/// to the `key` query parameter on `base_url`, consistent with Gemini
/// authenticating over the URL rather than a header.
pub struct GeminiApiKeyTransformer {
    configured_api_key: String,
}

impl GeminiApiKeyTransformer {
    pub fn new(configured_api_key: impl Into<String>) -> Self {
        Self { configured_api_key: configured_api_key.into() }
    }

    fn resolve_key(&self, ctx: &RequestCtx) -> Option<String> {
        if !self.configured_api_key.is_empty() {
            return Some(self.configured_api_key.clone());
        }
        if let Some(auth) = ctx.headers.get("authorization").or_else(|| ctx.headers.get("Authorization")) {
            if let Some(token) = auth.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
        ctx.headers.get("x-goog-api-key").cloned()
    }
}

impl RequestTransformer for GeminiApiKeyTransformer {
    fn name(&self) -> &str {
        "GeminiApiKeyTransformer"
    }

    fn transform(&self, request: Value, ctx: &mut RequestCtx) -> Result<Value> {
        let key = self
            .resolve_key(ctx)
            .ok_or_else(|| ProxyError::config("no Gemini API key available from config or client headers"))?;

        ctx.headers.remove("authorization");
        ctx.headers.remove("Authorization");
        ctx.headers.remove("x-goog-api-key");

        let (base, query) = match ctx.base_url.split_once('?') {
            Some((base, query)) => (base.to_string(), Some(query.to_string())),
            None => (ctx.base_url.clone(), None),
        };

        let mut pairs: Vec<(String, String)> = query
            .as_deref()
            .map(|q| {
                q.split('&')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        pairs.retain(|(k, _)| k != "key");
        pairs.push(("key".to_string(), key));

        let new_query = pairs.into_iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        *ctx.base_url = format!("{base}?{new_query}");

        Ok(request)
    }
}

/// JSONPath-driven body patch (§4.9, §9 JSONPath note). Operations are
/// validated at construction; a runtime failure on any one operation
/// reverts the whole transform to the pre-transform request, matching the
/// reference implementation's all-or-nothing recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyOp {
    Set,
    Delete,
    Append,
    Prepend,
    Merge,
}

pub struct BodyPatch {
    pub key: String,
    pub op: BodyOp,
    pub value: Value,
}

pub struct RequestBodyTransformer {
    patches: Vec<BodyPatch>,
}

impl RequestBodyTransformer {
    pub fn new(patches: Vec<BodyPatch>) -> Result<Self> {
        if patches.is_empty() {
            return Err(ProxyError::config("RequestBodyTransformer requires at least one operation"));
        }
        for patch in &patches {
            if !validate_path(&patch.key) {
                return Err(ProxyError::config(format!("invalid JSONPath expression '{}'", patch.key)));
            }
        }
        Ok(Self { patches })
    }

    fn apply(&self, mut request: Value) -> Result<Value> {
        for patch in &self.patches {
            match patch.op {
                BodyOp::Set => json_path::set_path(&mut request, &patch.key, patch.value.clone()),
                BodyOp::Delete => json_path::drop_field(&mut request, &patch.key),
                BodyOp::Append => json_path::append_path(&mut request, &patch.key, patch.value.clone()),
                BodyOp::Prepend => json_path::prepend_path(&mut request, &patch.key, patch.value.clone()),
                BodyOp::Merge => json_path::merge_path(&mut request, &patch.key, patch.value.clone()),
            }
        }
        Ok(request)
    }
}

impl RequestTransformer for RequestBodyTransformer {
    fn name(&self) -> &str {
        "RequestBodyTransformer"
    }

    fn transform(&self, request: Value, _ctx: &mut RequestCtx) -> Result<Value> {
        let original = request.clone();
        match self.apply(request) {
            Ok(transformed) => Ok(transformed),
            Err(e) => {
                tracing::error!(error = %e, "RequestBodyTransformer failed, reverting to pre-transform request");
                Ok(original)
            }
        }
    }
}

/// Filters client headers to a prefix whitelist, then injects the
/// configured auth header.
pub enum AuthStyle {
    XApiKey,
    BearerAuthorization,
}

pub struct AuthHeaderTransformer {
    allowed_prefixes: Vec<String>,
    style: AuthStyle,
    api_key: String,
}

impl AuthHeaderTransformer {
    pub fn new(api_key: impl Into<String>, style: AuthStyle, allowed_prefixes: Option<Vec<String>>) -> Self {
        Self {
            allowed_prefixes: allowed_prefixes.unwrap_or_else(|| vec!["x-".into(), "anthropic".into(), "user-".into()]),
            style,
            api_key: api_key.into(),
        }
    }
}

impl RequestTransformer for AuthHeaderTransformer {
    fn name(&self) -> &str {
        "AuthHeaderTransformer"
    }

    fn transform(&self, request: Value, ctx: &mut RequestCtx) -> Result<Value> {
        ctx.headers.retain(|k, _| {
            let lower = k.to_lowercase();
            self.allowed_prefixes.iter().any(|p| lower.starts_with(p.as_str()))
        });
        match self.style {
            AuthStyle::XApiKey => {
                ctx.headers.insert("x-api-key".to_string(), self.api_key.clone());
            }
            AuthStyle::BearerAuthorization => {
                ctx.headers.insert("authorization".to_string(), format!("Bearer {}", self.api_key));
            }
        }
        Ok(request)
    }
}

/// Replaces tool descriptions by name from a configured table
/// (SPEC_FULL.md §13: the reference table is a deployment tuning
/// artifact, modeled here as constructor params rather than a constant).
pub struct ToolDescriptionOptimizer {
    replacements: std::collections::HashMap<String, String>,
}

impl ToolDescriptionOptimizer {
    pub fn new(replacements: std::collections::HashMap<String, String>) -> Self {
        Self { replacements }
    }
}

impl RequestTransformer for ToolDescriptionOptimizer {
    fn name(&self) -> &str {
        "ToolDescriptionOptimizer"
    }

    fn transform(&self, mut request: Value, _ctx: &mut RequestCtx) -> Result<Value> {
        if let Some(tools) = request.get_mut("tools").and_then(Value::as_array_mut) {
            for tool in tools {
                let Some(name) = tool.get("name").and_then(Value::as_str).map(str::to_string) else {
                    continue;
                };
                if let Some(replacement) = self.replacements.get(&name) {
                    if let Some(obj) = tool.as_object_mut() {
                        obj.insert("description".to_string(), Value::String(replacement.clone()));
                    }
                }
            }
        }
        Ok(request)
    }
}
