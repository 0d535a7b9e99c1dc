//! Provider Client (§4.5): one configured backend. Owns its HTTP client and
//! its resolved per-channel/per-stage transformer pipelines, and executes
//! one operation end to end.

use crate::config::ProviderConfig;
use crate::descriptors::ProviderDescriptor;
use crate::error::{ProxyError, Result};
use crate::transform::{RequestCtx, ResponseCtx};
use crate::transformer_loader::{ConstructorRegistry, TransformerLoader};
use crate::types::{Channel, ExchangeRequest, ExchangeResponse, Operation, RoutingKey, Stage};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Headers stripped from the client's original request before building the
/// upstream call; the provider's own auth transformer injects what it needs.
const STRIPPED_HEADERS: [&str; 2] = ["x-api-key", "authorization"];

pub struct ProviderClient {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub backend_type: crate::types::ProviderBackendType,
    capabilities: HashSet<Operation>,
    http: reqwest::Client,
    pipelines: HashMap<(Channel, Stage), Vec<crate::transform::LoadedTransformer>>,
}

/// Composes `pipeline[channel][stage] = pre + (override or default) + post` (§4.5).
fn resolve_pipeline(
    config: &ProviderConfig,
    descriptor: &ProviderDescriptor,
    channel: Channel,
    stage: Stage,
    loader: &TransformerLoader,
    registry: &ConstructorRegistry,
) -> Vec<crate::transform::LoadedTransformer> {
    let stage_config = config.channel_transformers(channel);
    let middle_refs: &[crate::types::TransformerRef] = match stage_config.override_for(stage) {
        Some(explicit) => explicit,
        None => descriptor.default_transformers.get(channel, stage),
    };

    let mut refs = Vec::new();
    refs.extend(stage_config.pre_for(stage).iter().cloned());
    refs.extend(middle_refs.iter().cloned());
    refs.extend(stage_config.post_for(stage).iter().cloned());

    loader.load_chain(&refs, registry)
}

impl ProviderClient {
    pub fn new(config: &ProviderConfig, descriptor: &ProviderDescriptor, loader: &TransformerLoader, registry: &ConstructorRegistry) -> Result<Self> {
        config.validate_capabilities(descriptor)?;
        let capabilities: HashSet<Operation> = config.enabled_operations(descriptor).into_iter().collect();

        let mut pipelines = HashMap::new();
        for &channel in &[Channel::Claude, Channel::Codex] {
            for &stage in &[Stage::Request, Stage::Response, Stage::Stream] {
                let chain = resolve_pipeline(config, descriptor, channel, stage, loader, registry);
                pipelines.insert((channel, stage), chain);
            }
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(ProxyError::Http)?;

        Ok(Self {
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            backend_type: config.backend_type,
            capabilities,
            http,
            pipelines,
        })
    }

    fn pipeline(&self, channel: Channel, stage: Stage) -> &[crate::transform::LoadedTransformer] {
        self.pipelines.get(&(channel, stage)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Runs the request-stage pipeline (§4.5 steps 3-4) and builds the final
    /// upstream URL. Shared by both the non-streaming and streaming
    /// execution paths so the pipeline-composition law is applied exactly
    /// once per call site.
    fn build_upstream_call(
        &self,
        operation: Operation,
        descriptor: &ProviderDescriptor,
        exchange: &ExchangeRequest,
        original_headers: &HashMap<String, String>,
        resolved_model_id: &str,
        routing_key: RoutingKey,
        stream: bool,
    ) -> Result<(String, serde_json::Value, HashMap<String, String>)> {
        if !self.capabilities.contains(&operation) {
            return Err(ProxyError::UnsupportedOperation {
                provider: self.name.clone(),
                operation: operation.to_string(),
            });
        }

        let mut current_request = exchange.payload.clone();
        let mut current_headers = strip_auth_headers(original_headers);
        set_stream_flag(&mut current_request, stream);

        let mut base_url = self.base_url.clone();
        for transformer in self.pipeline(exchange.channel, Stage::Request) {
            if let Some(t) = transformer.as_request() {
                let mut ctx = RequestCtx {
                    headers: &mut current_headers,
                    base_url: &mut base_url,
                    original_request: &exchange.payload,
                    routing_key,
                    exchange,
                };
                current_request = t.transform(current_request, &mut ctx).map_err(|e| {
                    ProxyError::transform(t.name().to_string(), e.to_string())
                })?;
            }
        }

        let suffix = descriptor
            .suffix(operation)
            .ok_or_else(|| ProxyError::UnsupportedOperation { provider: self.name.clone(), operation: operation.to_string() })?;
        let url = build_url(&base_url, suffix, resolved_model_id)?;

        Ok((url, current_request, current_headers))
    }

    /// Execute one non-streaming operation (§4.5 steps 1-9).
    pub async fn execute(
        &self,
        operation: Operation,
        descriptor: &ProviderDescriptor,
        exchange: &ExchangeRequest,
        original_headers: &HashMap<String, String>,
        resolved_model_id: &str,
        routing_key: RoutingKey,
    ) -> Result<ExchangeResponse> {
        let (url, current_request, current_headers) =
            self.build_upstream_call(operation, descriptor, exchange, original_headers, resolved_model_id, routing_key, false)?;

        let mut request = self.http.post(&url).json(&current_request);
        for (key, value) in &current_headers {
            request = request.header(key, value);
        }
        let response = request.send().await.map_err(ProxyError::Http)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::upstream(Some(status.as_u16()), body));
        }

        let mut response_json: serde_json::Value = response.json().await.map_err(ProxyError::Http)?;
        for transformer in self.pipeline(exchange.channel, Stage::Response) {
            if let Some(t) = transformer.as_response() {
                let ctx = ResponseCtx {
                    request: &current_request,
                    final_headers: &current_headers,
                    original_request: &exchange.payload,
                    routing_key,
                    exchange,
                };
                response_json = t.transform(response_json, &ctx).map_err(|e| {
                    ProxyError::transform(t.name().to_string(), e.to_string())
                })?;
            }
        }

        Ok(ExchangeResponse {
            channel: exchange.channel,
            model: resolved_model_id.to_string(),
            payload: response_json,
            stream: exchange.original_stream,
            metadata: HashMap::from([
                ("operation".to_string(), operation.to_string()),
                ("provider".to_string(), self.name.clone()),
            ]),
        })
    }

    /// Execute one streaming operation: same request pipeline as [`Self::execute`]
    /// but the upstream call itself streams (§4.5's streaming-execution note).
    /// Returns the live upstream `reqwest::Response` plus the post-pipeline
    /// request body (for the stream chunk transformers' `original_request`/
    /// `StreamCtx` needs) so the caller can drive the byte-chunk loop.
    pub async fn execute_streaming(
        &self,
        operation: Operation,
        descriptor: &ProviderDescriptor,
        exchange: &ExchangeRequest,
        original_headers: &HashMap<String, String>,
        resolved_model_id: &str,
        routing_key: RoutingKey,
    ) -> Result<(reqwest::Response, serde_json::Value)> {
        let (url, current_request, current_headers) =
            self.build_upstream_call(operation, descriptor, exchange, original_headers, resolved_model_id, routing_key, true)?;

        let mut request = self.http.post(&url).json(&current_request);
        for (key, value) in &current_headers {
            request = request.header(key, value);
        }
        let response = request.send().await.map_err(ProxyError::Http)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::upstream(Some(status.as_u16()), body));
        }

        Ok((response, current_request))
    }

    /// Resolved stream-stage chain, exposed for the edge handler's byte
    /// piping loop (which owns the upstream streaming call itself).
    pub fn stream_pipeline(&self, channel: Channel) -> &[crate::transform::LoadedTransformer] {
        self.pipeline(channel, Stage::Stream)
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }
}

fn strip_auth_headers(original: &HashMap<String, String>) -> HashMap<String, String> {
    original
        .iter()
        .filter(|(k, _)| !STRIPPED_HEADERS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn set_stream_flag(request: &mut serde_json::Value, stream: bool) {
    if let Some(obj) = request.as_object_mut() {
        obj.insert("stream".to_string(), serde_json::Value::Bool(stream));
    }
}

/// Builds the final upstream URL by inserting the operation suffix between
/// `base_url`'s path and any query string a request transformer already
/// attached to it (e.g. Gemini's `?key=...`), so the suffix always lands on
/// the path rather than after an existing query string: `.../generateContent?key=K`,
/// not `...?key=K/generateContent`.
fn build_url(base_url: &str, suffix: &str, resolved_model_id: &str) -> Result<String> {
    let resolved_suffix = if suffix.contains("{model}") {
        if resolved_model_id.is_empty() {
            return Err(ProxyError::config("operation requires a resolved model id but none was available"));
        }
        suffix.replace("{model}", resolved_model_id)
    } else {
        suffix.to_string()
    };

    let (path, query) = match base_url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (base_url, None),
    };
    let mut url = format!("{}{resolved_suffix}", path.trim_end_matches('/'));
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    Ok(url)
}
