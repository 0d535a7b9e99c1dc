//! Static, process-wide descriptor table: for each upstream backend type,
//! which operations it exposes, what URL suffix each resolves to, what the
//! default per-channel/per-stage transformer chain looks like when the user
//! supplies no override, and its capability flags.

use crate::types::{Channel, Operation, ProviderBackendType, Stage, TransformerRef};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Default transformer chains, keyed by channel then stage.
#[derive(Debug, Clone, Default)]
pub struct ChannelTransformers {
    pub by_channel: HashMap<Channel, HashMap<Stage, Vec<TransformerRef>>>,
}

impl ChannelTransformers {
    pub fn get(&self, channel: Channel, stage: Stage) -> &[TransformerRef] {
        self.by_channel
            .get(&channel)
            .and_then(|stages| stages.get(&stage))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn transformer(class_path: &str) -> TransformerRef {
    TransformerRef {
        class_path: class_path.to_string(),
        params: serde_json::Map::new(),
    }
}

/// Describes capabilities and defaults for one backend type.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub backend_type: ProviderBackendType,
    pub suffixes: HashMap<Operation, &'static str>,
    pub default_transformers: ChannelTransformers,
    pub supports_streaming: bool,
    pub supports_count_tokens: bool,
    pub supports_responses: bool,
}

impl ProviderDescriptor {
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.suffixes.keys()
    }

    pub fn suffix(&self, op: Operation) -> Option<&'static str> {
        self.suffixes.get(&op).copied()
    }
}

fn build_anthropic() -> ProviderDescriptor {
    let mut suffixes = HashMap::new();
    suffixes.insert(Operation::Messages, "/v1/messages");
    suffixes.insert(Operation::CountTokens, "/v1/messages/count_tokens");

    // Pass-through backend: defaults are empty chains for every stage.
    let mut by_channel = HashMap::new();
    by_channel.insert(Channel::Claude, HashMap::new());

    ProviderDescriptor {
        backend_type: ProviderBackendType::Anthropic,
        suffixes,
        default_transformers: ChannelTransformers { by_channel },
        supports_streaming: true,
        supports_count_tokens: true,
        supports_responses: false,
    }
}

fn build_openai() -> ProviderDescriptor {
    let mut suffixes = HashMap::new();
    suffixes.insert(Operation::Messages, "/v1/chat/completions");

    let mut stages = HashMap::new();
    stages.insert(
        Stage::Request,
        vec![transformer("ccproxy_transformers::openai_chat::RequestTransformer")],
    );
    stages.insert(
        Stage::Response,
        vec![transformer("ccproxy_transformers::openai_chat::ResponseTransformer")],
    );
    stages.insert(
        Stage::Stream,
        vec![transformer("ccproxy_transformers::openai_chat::StreamTransformer")],
    );
    let mut by_channel = HashMap::new();
    by_channel.insert(Channel::Claude, stages);

    ProviderDescriptor {
        backend_type: ProviderBackendType::Openai,
        suffixes,
        default_transformers: ChannelTransformers { by_channel },
        supports_streaming: true,
        supports_count_tokens: false,
        supports_responses: false,
    }
}

fn build_openai_responses() -> ProviderDescriptor {
    let mut suffixes = HashMap::new();
    suffixes.insert(Operation::Responses, "/v1/responses");

    let mut stages = HashMap::new();
    stages.insert(
        Stage::Request,
        vec![transformer("ccproxy_transformers::openai_responses::RequestTransformer")],
    );
    stages.insert(
        Stage::Response,
        vec![transformer("ccproxy_transformers::openai_responses::ResponseTransformer")],
    );
    let mut by_channel = HashMap::new();
    by_channel.insert(Channel::Claude, stages);

    ProviderDescriptor {
        backend_type: ProviderBackendType::OpenaiResponses,
        suffixes,
        default_transformers: ChannelTransformers { by_channel },
        supports_streaming: false,
        supports_count_tokens: false,
        supports_responses: true,
    }
}

fn build_gemini() -> ProviderDescriptor {
    let mut suffixes = HashMap::new();
    suffixes.insert(Operation::Messages, "/v1beta/models/{model}:generateContent");
    suffixes.insert(Operation::CountTokens, "/v1beta/models/{model}:countTokens");

    let mut req_stage = vec![transformer("ccproxy_transformers::gemini::RequestTransformer")];
    req_stage.push(transformer("ccproxy_transformers::generic::GeminiApiKeyTransformer"));

    let mut stages = HashMap::new();
    stages.insert(Stage::Request, req_stage);
    stages.insert(
        Stage::Response,
        vec![transformer("ccproxy_transformers::gemini::ResponseTransformer")],
    );
    stages.insert(
        Stage::Stream,
        vec![transformer("ccproxy_transformers::gemini::StreamTransformer")],
    );
    let mut by_channel = HashMap::new();
    by_channel.insert(Channel::Claude, stages);

    ProviderDescriptor {
        backend_type: ProviderBackendType::Gemini,
        suffixes,
        default_transformers: ChannelTransformers { by_channel },
        supports_streaming: true,
        supports_count_tokens: true,
        supports_responses: false,
    }
}

/// Process-wide immutable descriptor table.
pub struct DescriptorRegistry {
    descriptors: HashMap<ProviderBackendType, ProviderDescriptor>,
}

impl DescriptorRegistry {
    fn build() -> Self {
        let mut descriptors = HashMap::new();
        descriptors.insert(ProviderBackendType::Anthropic, build_anthropic());
        descriptors.insert(ProviderBackendType::Openai, build_openai());
        descriptors.insert(ProviderBackendType::OpenaiResponses, build_openai_responses());
        descriptors.insert(ProviderBackendType::Gemini, build_gemini());
        Self { descriptors }
    }

    /// Look up the descriptor for a backend type. Requesting a type outside
    /// the closed set is impossible at the type level, so this never fails;
    /// an unknown *string* from config is rejected earlier, in `config::parse_backend_type`.
    pub fn get(&self, backend_type: ProviderBackendType) -> &ProviderDescriptor {
        self.descriptors
            .get(&backend_type)
            .expect("descriptor table covers every ProviderBackendType variant")
    }
}

static REGISTRY: OnceLock<DescriptorRegistry> = OnceLock::new();

/// Global accessor for the descriptor table, built once lazily.
pub fn registry() -> &'static DescriptorRegistry {
    REGISTRY.get_or_init(DescriptorRegistry::build)
}
