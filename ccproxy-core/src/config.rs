//! Typed configuration surface consumed by the core (§6.3). Loading the file
//! from disk, watching it for changes and hot-swapping the derived runtime
//! objects are edge concerns (SPEC_FULL.md §"Config loading & hot reload");
//! this module only defines the schema and its validation.

use crate::error::{ProxyError, Result};
use crate::types::{Channel, Operation, ProviderBackendType, Stage, TransformerRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_timeout() -> u64 {
    180
}

/// Per-stage transformer overrides for one channel: an explicit override
/// list (which replaces the descriptor default, even if empty) plus
/// pre/post lists that always wrap whatever the middle resolves to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformerStageConfig {
    #[serde(default)]
    pub request: Option<Vec<TransformerRef>>,
    #[serde(default)]
    pub response: Option<Vec<TransformerRef>>,
    #[serde(default)]
    pub stream: Option<Vec<TransformerRef>>,

    #[serde(default)]
    pub pre_request: Vec<TransformerRef>,
    #[serde(default)]
    pub post_request: Vec<TransformerRef>,
    #[serde(default)]
    pub pre_response: Vec<TransformerRef>,
    #[serde(default)]
    pub post_response: Vec<TransformerRef>,
    #[serde(default)]
    pub pre_stream: Vec<TransformerRef>,
    #[serde(default)]
    pub post_stream: Vec<TransformerRef>,
}

impl TransformerStageConfig {
    pub fn override_for(&self, stage: Stage) -> Option<&Vec<TransformerRef>> {
        match stage {
            Stage::Request => self.request.as_ref(),
            Stage::Response => self.response.as_ref(),
            Stage::Stream => self.stream.as_ref(),
        }
    }

    pub fn pre_for(&self, stage: Stage) -> &[TransformerRef] {
        match stage {
            Stage::Request => &self.pre_request,
            Stage::Response => &self.pre_response,
            Stage::Stream => &self.pre_stream,
        }
    }

    pub fn post_for(&self, stage: Stage) -> &[TransformerRef] {
        match stage {
            Stage::Request => &self.post_request,
            Stage::Response => &self.post_response,
            Stage::Stream => &self.post_stream,
        }
    }
}

/// One configured backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(rename = "type")]
    pub backend_type: ProviderBackendType,
    #[serde(default)]
    pub capabilities: Option<Vec<Operation>>,
    #[serde(default)]
    pub transformers: HashMap<Channel, TransformerStageConfig>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl ProviderConfig {
    pub fn channel_transformers(&self, channel: Channel) -> TransformerStageConfig {
        self.transformers.get(&channel).cloned().unwrap_or_default()
    }

    /// Validate `capabilities` against the descriptor's operation set.
    /// Requesting an operation the descriptor doesn't expose is a config error.
    pub fn validate_capabilities(&self, descriptor: &crate::descriptors::ProviderDescriptor) -> Result<()> {
        let Some(caps) = &self.capabilities else {
            return Ok(());
        };
        for cap in caps {
            if descriptor.suffix(*cap).is_none() {
                return Err(ProxyError::config(format!(
                    "provider '{}' requests unsupported capability '{}' for backend type '{}'",
                    self.name, cap, self.backend_type
                )));
            }
        }
        Ok(())
    }

    /// Effective set of enabled operations: the explicit subset, or every
    /// operation the descriptor exposes when unset.
    pub fn enabled_operations(&self, descriptor: &crate::descriptors::ProviderDescriptor) -> Vec<Operation> {
        match &self.capabilities {
            Some(caps) => caps.clone(),
            None => descriptor.operations().copied().collect(),
        }
    }
}

/// Links a user-facing alias to a `(provider, upstream model id)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub id: String,
    pub provider: String,
    pub alias: String,
}

impl ModelConfig {
    /// Resolved upstream model id: `id` if set, else the alias itself
    /// (mirrors the reference implementation's `set_default_id` validator).
    pub fn resolved_id(&self) -> &str {
        if self.id.is_empty() {
            &self.alias
        } else {
            &self.id
        }
    }

    pub fn validate(&self) -> Result<()> {
        let valid = !self.alias.is_empty()
            && self.alias.len() <= 50
            && self
                .alias
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ProxyError::config(format!(
                "model alias '{}' must be 1-50 chars of [A-Za-z0-9_-]",
                self.alias
            )));
        }
        Ok(())
    }
}

/// One model alias per routing key. Empty string means "fall through to default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub default: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub planning: String,
    #[serde(default)]
    pub thinking: String,
    #[serde(default)]
    pub plan_and_think: String,
    #[serde(default)]
    pub builtin_tools: String,
}

impl RoutingConfig {
    /// Alias for a routing key, falling through to `default` when empty.
    pub fn alias_for(&self, key: crate::types::RoutingKey) -> &str {
        use crate::types::RoutingKey::*;
        let candidate = match key {
            Default => &self.default,
            Background => &self.background,
            Planning => &self.planning,
            Thinking => &self.thinking,
            PlanAndThink => &self.plan_and_think,
            BuiltinTools => &self.builtin_tools,
            // AgentDirect/Direct never consult RoutingConfig; callers resolve
            // the alias straight off the request before reaching here.
            AgentDirect | Direct => "",
        };
        if candidate.is_empty() {
            &self.default
        } else {
            candidate
        }
    }
}

/// Root configuration object (§6.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub routing: Option<RoutingConfig>,
    #[serde(default)]
    pub transformer_paths: Vec<String>,
}

impl UserConfig {
    pub fn get_provider_by_name(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn get_model_by_alias(&self, alias: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.alias == alias)
    }

    /// Cross-reference validation: every model references a known provider,
    /// aliases are unique, routing aliases (when non-empty) are known.
    pub fn validate_references(&self) -> Result<()> {
        let mut errors = Vec::new();

        for model in &self.models {
            if let Err(e) = model.validate() {
                errors.push(e.to_string());
            }
            if self.get_provider_by_name(&model.provider).is_none() {
                errors.push(format!("model '{}' references unknown provider '{}'", model.alias, model.provider));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for model in &self.models {
            if !seen.insert(model.alias.as_str()) {
                errors.push(format!("duplicate alias '{}'", model.alias));
            }
        }

        if let Some(routing) = &self.routing {
            let checks = [
                ("default", routing.default.as_str()),
                ("background", routing.background.as_str()),
                ("planning", routing.planning.as_str()),
                ("thinking", routing.thinking.as_str()),
                ("plan_and_think", routing.plan_and_think.as_str()),
                ("builtin_tools", routing.builtin_tools.as_str()),
            ];
            for (field, alias) in checks {
                if !alias.is_empty() && self.get_model_by_alias(alias).is_none() {
                    errors.push(format!("routing '{field}' references unknown alias '{alias}'"));
                }
            }
        }

        for provider in &self.providers {
            let descriptor = crate::descriptors::registry().get(provider.backend_type);
            if let Err(e) = provider.validate_capabilities(descriptor) {
                errors.push(e.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProxyError::config(format!(
                "configuration validation failed:\n{}",
                errors.join("\n")
            )))
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw).map_err(|e| ProxyError::config(format!("invalid YAML: {e}")))?;
        config.validate_references()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            base_url: "https://example.com".to_string(),
            api_key: "k".to_string(),
            backend_type: ProviderBackendType::Openai,
            capabilities: None,
            transformers: HashMap::new(),
            timeout: 180,
        }
    }

    #[test]
    fn routing_falls_through_to_default_on_empty() {
        let routing = RoutingConfig {
            default: "alias-a".into(),
            background: "".into(),
            ..Default::default()
        };
        assert_eq!(routing.alias_for(crate::types::RoutingKey::Background), "alias-a");
    }

    #[test]
    fn duplicate_alias_is_rejected() {
        let config = UserConfig {
            providers: vec![provider("p1")],
            models: vec![
                ModelConfig {
                    id: "".into(),
                    provider: "p1".into(),
                    alias: "dup".into(),
                },
                ModelConfig {
                    id: "".into(),
                    provider: "p1".into(),
                    alias: "dup".into(),
                },
            ],
            routing: None,
            transformer_paths: vec![],
        };
        assert!(config.validate_references().is_err());
    }

    #[test]
    fn model_without_id_resolves_to_alias() {
        let m = ModelConfig {
            id: "".into(),
            provider: "p1".into(),
            alias: "gpt".into(),
        };
        assert_eq!(m.resolved_id(), "gpt");
    }

    #[test]
    fn unknown_provider_reference_is_rejected() {
        let config = UserConfig {
            providers: vec![],
            models: vec![ModelConfig {
                id: "".into(),
                provider: "missing".into(),
                alias: "a".into(),
            }],
            routing: None,
            transformer_paths: vec![],
        };
        assert!(config.validate_references().is_err());
    }
}
