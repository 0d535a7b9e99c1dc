//! Error taxonomy for the gateway core.
//!
//! Mirrors the kinds in the design: configuration problems are fatal at
//! construction time, everything else is a per-request failure that the
//! edge handler turns into an HTTP error or an inline `event: error` frame.

use thiserror::Error;

/// Errors produced by the routing-and-transformation core.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Invalid provider/model/routing references, bad JSONPath, unsupported
    /// capability. Raised at construction or config reload.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation not enabled/declared for a provider.
    #[error("unsupported operation '{operation}' on provider '{provider}'")]
    UnsupportedOperation { provider: String, operation: String },

    /// Network failure or non-2xx from an upstream provider.
    #[error("upstream transport error ({status:?}): {message}")]
    UpstreamTransport {
        status: Option<u16>,
        message: String,
    },

    /// A transformer raised while running the pipeline.
    #[error("transform error in '{transformer}': {message}")]
    Transform { transformer: String, message: String },

    /// Unknown alias on a non-claude channel.
    #[error("routing error: {0}")]
    Routing(String),

    /// JSON (de)serialization failure not otherwise classified.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport-level reqwest failure.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProxyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn transform(transformer: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transform {
            transformer: transformer.into(),
            message: msg.into(),
        }
    }

    pub fn upstream(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::UpstreamTransport {
            status,
            message: msg.into(),
        }
    }

    /// Whether this error should be reported as a 4xx-equivalent to the
    /// client (as opposed to an opaque 5xx).
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedOperation { .. } | Self::Routing(_) | Self::Config(_)
        )
    }

    /// Render as the Anthropic error-shaped JSON body used both for
    /// pre-stream HTTP error responses and inline `event: error` frames.
    pub fn to_anthropic_error_body(&self, correlation_id: &str) -> serde_json::Value {
        serde_json::json!({
            "type": "error",
            "error": {
                "type": self.anthropic_error_type(),
                "message": self.to_string(),
            },
            "request_id": correlation_id,
        })
    }

    fn anthropic_error_type(&self) -> &'static str {
        match self {
            Self::Config(_) => "invalid_request_error",
            Self::UnsupportedOperation { .. } => "invalid_request_error",
            Self::Routing(_) => "invalid_request_error",
            Self::UpstreamTransport { .. } => "api_error",
            Self::Transform { .. } => "api_error",
            Self::Serialization(_) => "api_error",
            Self::Http(_) => "api_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
