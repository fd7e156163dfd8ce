//! Model catalog construction
//!
//! The catalog merges three sources into one deduplicated, canonically
//! ordered list of usable models: a synthesized local-server entry, a
//! curated table of direct-provider models gated on their credentials, and
//! the aggregator's ranked listing. Building never fails; a missing remote
//! listing just yields a smaller catalog.

use tracing::debug;

use crate::api::models as remote;
use crate::api::RankedModel;
use crate::core::providers::{Credentials, LocalServerConfig, Provider};
use crate::core::strategy;

/// Declared modality of a model. Anything the listing does not explicitly
/// call multimodal is treated as text-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Multimodal,
}

impl Modality {
    pub fn from_declared(declared: Option<&str>) -> Modality {
        match declared {
            Some("multimodal") => Modality::Multimodal,
            _ => Modality::Text,
        }
    }
}

/// Where a catalog entry came from. Direct entries win over
/// aggregator-sourced duplicates of the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    Direct,
    Aggregator,
}

/// One usable model. Immutable once constructed; the catalog is rebuilt
/// wholesale whenever credentials or preferences change.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    /// Opaque id, usually `provider-namespace/model-name`.
    pub id: String,
    pub display_name: String,
    pub provider: Provider,
    pub source: ModelSource,
    pub is_free: bool,
    pub context_length: u32,
    pub modality: Modality,
    pub popularity: Option<f64>,
}

impl ModelDescriptor {
    /// The id without its provider namespace, as native endpoints expect.
    pub fn short_id(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

struct CuratedModel {
    provider: Provider,
    id: &'static str,
    name: &'static str,
    context_length: u32,
    modality: Modality,
}

/// Known-good models for each direct provider. Hand-maintained metadata;
/// only appended when the matching credential is present.
const CURATED_DIRECT_MODELS: &[CuratedModel] = &[
    CuratedModel {
        provider: Provider::Google,
        id: "google/gemini-1.5-pro-latest",
        name: "Gemini 1.5 Pro",
        context_length: 1_000_000,
        modality: Modality::Multimodal,
    },
    CuratedModel {
        provider: Provider::Google,
        id: "google/gemini-1.5-flash-latest",
        name: "Gemini 1.5 Flash",
        context_length: 1_000_000,
        modality: Modality::Multimodal,
    },
    CuratedModel {
        provider: Provider::OpenAi,
        id: "openai/gpt-4o",
        name: "GPT-4o",
        context_length: 128_000,
        modality: Modality::Multimodal,
    },
    CuratedModel {
        provider: Provider::OpenAi,
        id: "openai/gpt-4-turbo",
        name: "GPT-4 Turbo",
        context_length: 128_000,
        modality: Modality::Multimodal,
    },
    CuratedModel {
        provider: Provider::Anthropic,
        id: "anthropic/claude-3.5-sonnet",
        name: "Claude 3.5 Sonnet",
        context_length: 200_000,
        modality: Modality::Multimodal,
    },
    CuratedModel {
        provider: Provider::Anthropic,
        id: "anthropic/claude-3-opus",
        name: "Claude 3 Opus",
        context_length: 200_000,
        modality: Modality::Multimodal,
    },
    CuratedModel {
        provider: Provider::Cohere,
        id: "cohere/command-r+",
        name: "Command R+",
        context_length: 128_000,
        modality: Modality::Multimodal,
    },
    CuratedModel {
        provider: Provider::Mistral,
        id: "mistralai/mistral-large-latest",
        name: "Mistral Large",
        context_length: 32_000,
        modality: Modality::Text,
    },
    CuratedModel {
        provider: Provider::Xai,
        id: "xai/grok-1",
        name: "Grok-1",
        context_length: 8_192,
        modality: Modality::Text,
    },
    CuratedModel {
        provider: Provider::Alibaba,
        id: "alibaba/qwen-turbo",
        name: "Qwen Turbo",
        context_length: 8_000,
        modality: Modality::Text,
    },
    CuratedModel {
        provider: Provider::Zhipu,
        id: "zhipu/glm-4",
        name: "GLM-4",
        context_length: 128_000,
        modality: Modality::Text,
    },
    CuratedModel {
        provider: Provider::Moonshot,
        id: "moonshot/moonshot-v1-128k",
        name: "Moonshot v1",
        context_length: 128_000,
        modality: Modality::Text,
    },
];

/// Id substrings that exclude a listing entry from the chat catalog.
const EXCLUDED_ID_TERMS: &[&str] = &[
    "sdxl",
    "dall-e",
    "stable-diffusion",
    "whisper",
    "tts",
    "pdx-cs-ai",
    "image",
    "edit",
];

pub const LOCAL_MODEL_ID: &str = "local/local-model";

/// Build the catalog from explicit state snapshots. Pure: the remote
/// listing and whitelist are passed in, already fetched (or empty).
pub fn build_catalog(
    credentials: &Credentials,
    local: &LocalServerConfig,
    remote: &[RankedModel],
    whitelist: &[String],
) -> Vec<ModelDescriptor> {
    let mut combined: Vec<ModelDescriptor> = Vec::new();

    if local.is_configured() {
        if local.chat_endpoint().is_some() {
            combined.push(ModelDescriptor {
                id: LOCAL_MODEL_ID.to_string(),
                display_name: "Local LLM".to_string(),
                provider: Provider::Local,
                source: ModelSource::Direct,
                is_free: false,
                context_length: 32_000,
                modality: Modality::Multimodal,
                popularity: None,
            });
        } else {
            debug!(base_url = %local.base_url, "skipping local model: server URL does not parse");
        }
    }

    for curated in CURATED_DIRECT_MODELS {
        if credentials.has(curated.provider) {
            combined.push(ModelDescriptor {
                id: curated.id.to_string(),
                display_name: curated.name.to_string(),
                provider: curated.provider,
                source: ModelSource::Direct,
                is_free: false,
                context_length: curated.context_length,
                modality: curated.modality,
                popularity: None,
            });
        }
    }

    if credentials.has(Provider::OpenRouter) || credentials.has(Provider::Groq) {
        combined.extend(
            remote
                .iter()
                .filter_map(|model| classify_ranked(model, credentials, whitelist)),
        );
    }

    let deduplicated = deduplicate(combined);
    strategy::sort_for_display(deduplicated)
}

/// Fetch the remote feeds (each cached once per process, failing soft to
/// empty) and build the catalog from them.
pub async fn load_catalog(
    client: &reqwest::Client,
    credentials: &Credentials,
    local: &LocalServerConfig,
) -> Vec<ModelDescriptor> {
    let needs_remote = credentials.has(Provider::OpenRouter) || credentials.has(Provider::Groq);
    let (ranked, whitelist): (&[RankedModel], &[String]) = if needs_remote {
        (
            remote::ranked_models(client).await,
            remote::freemium_whitelist(client).await,
        )
    } else {
        (&[], &[])
    };
    build_catalog(credentials, local, ranked, whitelist)
}

fn classify_ranked(
    model: &RankedModel,
    credentials: &Credentials,
    whitelist: &[String],
) -> Option<ModelDescriptor> {
    let provider = Provider::from_model_id(&model.id);
    let modality = Modality::from_declared(
        model
            .architecture
            .as_ref()
            .and_then(|architecture| architecture.modality.as_deref()),
    );

    let is_chat_model = model.id.contains("chat")
        || model.id.contains("instruct")
        || modality == Modality::Multimodal
        || provider == Provider::Groq
        || model.id.contains("claude")
        || model.id.contains("gpt");
    let is_excluded = EXCLUDED_ID_TERMS.iter().any(|term| model.id.contains(term));
    let has_key = if provider == Provider::Groq {
        credentials.has(Provider::Groq)
    } else {
        credentials.has(Provider::OpenRouter)
    };

    if !has_key || !is_chat_model || is_excluded {
        return None;
    }

    let is_free = has_zero_pricing(model)
        || model.id.ends_with(":free")
        || whitelist.iter().any(|id| id == &model.id);

    Some(ModelDescriptor {
        id: model.id.clone(),
        display_name: model.name.clone().unwrap_or_else(|| model.id.clone()),
        provider,
        source: ModelSource::Aggregator,
        is_free,
        context_length: model.context_length.unwrap_or(0),
        modality,
        popularity: model.popularity,
    })
}

fn has_zero_pricing(model: &RankedModel) -> bool {
    let Some(pricing) = model.pricing.as_ref() else {
        return false;
    };
    let is_zero = |price: &Option<String>| {
        price
            .as_deref()
            .and_then(|value| value.parse::<f64>().ok())
            .is_some_and(|value| value == 0.0)
    };
    is_zero(&pricing.prompt) && is_zero(&pricing.completion)
}

/// Deduplicate by id. A later entry replaces an earlier one only when the
/// later entry is not aggregator-sourced, so direct-provider entries win
/// over aggregator duplicates regardless of insertion order.
fn deduplicate(combined: Vec<ModelDescriptor>) -> Vec<ModelDescriptor> {
    let mut unique: Vec<ModelDescriptor> = Vec::with_capacity(combined.len());
    for model in combined {
        match unique.iter_mut().find(|existing| existing.id == model.id) {
            Some(existing) => {
                if model.source != ModelSource::Aggregator {
                    *existing = model;
                }
            }
            None => unique.push(model),
        }
    }
    unique
}
