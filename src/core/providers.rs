//! Provider identities and credential state
//!
//! Every model descriptor carries a [`Provider`] tag. The tag decides which
//! credential unlocks the model, whether the model can be called on the
//! vendor's native endpoint, and how the request must be shaped.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The provider families the client knows how to talk to.
///
/// `OpenRouter` is the aggregator: one API surface fanning out to many
/// underlying models addressed by `namespace/model` ids. `Groq` is the
/// fast-inference provider whose models arrive through the aggregator
/// listing but are gated on its own credential. `Local` is a self-hosted
/// OpenAI-compatible server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenRouter,
    Groq,
    Google,
    OpenAi,
    Anthropic,
    Cohere,
    Mistral,
    Xai,
    Alibaba,
    Zhipu,
    Moonshot,
    Local,
}

impl Provider {
    pub const ALL: [Provider; 12] = [
        Provider::OpenRouter,
        Provider::Groq,
        Provider::Google,
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Cohere,
        Provider::Mistral,
        Provider::Xai,
        Provider::Alibaba,
        Provider::Zhipu,
        Provider::Moonshot,
        Provider::Local,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenRouter => "openrouter",
            Provider::Groq => "groq",
            Provider::Google => "google",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Cohere => "cohere",
            Provider::Mistral => "mistral",
            Provider::Xai => "xai",
            Provider::Alibaba => "alibaba",
            Provider::Zhipu => "zhipu",
            Provider::Moonshot => "moonshot",
            Provider::Local => "local",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Provider::OpenRouter => "OpenRouter",
            Provider::Groq => "Groq",
            Provider::Google => "Google",
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::Cohere => "Cohere",
            Provider::Mistral => "Mistral",
            Provider::Xai => "xAI",
            Provider::Alibaba => "Alibaba",
            Provider::Zhipu => "Zhipu AI",
            Provider::Moonshot => "Moonshot",
            Provider::Local => "Local server",
        }
    }

    /// Derive the provider tag for a model id coming out of the aggregator
    /// listing.
    ///
    /// Ids prefixed `groq/` belong to the fast-inference provider. The
    /// `mistralai` namespace is an aggregator alias, not the direct Mistral
    /// provider, so it normalizes to the aggregator tag. Unknown namespaces
    /// fall back to the aggregator as well.
    pub fn from_model_id(id: &str) -> Provider {
        if id.starts_with("groq/") {
            return Provider::Groq;
        }
        match id.split('/').next().unwrap_or_default() {
            "google" => Provider::Google,
            "openai" => Provider::OpenAi,
            "anthropic" => Provider::Anthropic,
            "cohere" => Provider::Cohere,
            "xai" => Provider::Xai,
            "alibaba" => Provider::Alibaba,
            "zhipu" => Provider::Zhipu,
            "moonshot" => Provider::Moonshot,
            "local" => Provider::Local,
            // "mistralai" is deliberately absent: those ids are served by
            // the aggregator.
            _ => Provider::OpenRouter,
        }
    }

    /// Providers the dispatcher can call on their own native endpoint.
    /// Everything else routes through the aggregator.
    pub fn has_native_endpoint(self) -> bool {
        matches!(
            self,
            Provider::OpenAi
                | Provider::Google
                | Provider::Zhipu
                | Provider::Groq
                | Provider::Local
        )
    }

    /// Aggregator-style providers: their catalog entries are sourced from
    /// the remote ranked listing rather than the curated direct table.
    pub fn is_aggregator(self) -> bool {
        matches!(self, Provider::OpenRouter | Provider::Groq)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-provider API keys, keyed by the provider's id string.
///
/// Stored as plain strings so the settings file round-trips the same map
/// the user configured. An empty value counts as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(HashMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key for `provider`, treating empty strings as unset.
    pub fn get(&self, provider: Provider) -> Option<&str> {
        self.0
            .get(provider.as_str())
            .map(String::as_str)
            .filter(|key| !key.trim().is_empty())
    }

    pub fn has(&self, provider: Provider) -> bool {
        self.get(provider).is_some()
    }

    pub fn set(&mut self, provider: Provider, key: impl Into<String>) {
        self.0.insert(provider.as_str().to_string(), key.into());
    }

    pub fn remove(&mut self, provider: Provider) {
        self.0.remove(provider.as_str());
    }

    pub fn any_present(&self) -> bool {
        Provider::ALL.iter().any(|&provider| self.has(provider))
    }
}

/// Configuration for a self-hosted OpenAI-compatible inference server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalServerConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl LocalServerConfig {
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    /// The chat-completions endpoint on the local server, or `None` when
    /// the configured base URL does not parse.
    pub fn chat_endpoint(&self) -> Option<reqwest::Url> {
        if !self.is_configured() {
            return None;
        }
        reqwest::Url::parse(self.base_url.trim())
            .and_then(|base| base.join("/v1/chat/completions"))
            .ok()
    }
}
