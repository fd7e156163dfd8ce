//! Capability classification
//!
//! Pure heuristics over a model descriptor. The same flags drive both
//! catalog filtering and UI capability badges, so the derivation must be
//! stable for a given input.

use crate::core::catalog::{Modality, ModelDescriptor};
use crate::core::providers::Provider;

/// Context lengths at or above this count as "large context".
const LARGE_CONTEXT_THRESHOLD: u32 = 128_000;

/// Id substrings that mark a model as flagship-tier.
const TOP_TIER_MARKERS: &[&str] = &[
    "gpt-4o",
    "claude-3.5-sonnet",
    "command-r-plus",
    "command-r+",
    "glm-4",
    "gemini-1.5",
    "claude-3-opus",
];

/// Id substrings that signal image understanding even when the declared
/// modality says otherwise.
const MULTIMODAL_ID_MARKERS: &[&str] = &["vision", "claude-3", "gpt-4o"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub is_multimodal: bool,
    pub has_large_context: bool,
    pub is_top_tier: bool,
}

/// Derive capability flags for a model descriptor.
///
/// The google provider's API is always multimodal, so its models count as
/// multimodal regardless of declared modality.
pub fn capabilities(model: &ModelDescriptor) -> Capabilities {
    let is_multimodal = model.modality == Modality::Multimodal
        || MULTIMODAL_ID_MARKERS
            .iter()
            .any(|marker| model.id.contains(marker))
        || model.provider == Provider::Google;

    let has_large_context = model.context_length >= LARGE_CONTEXT_THRESHOLD;

    let is_top_tier = TOP_TIER_MARKERS
        .iter()
        .any(|marker| model.id.contains(marker));

    Capabilities {
        is_multimodal,
        has_large_context,
        is_top_tier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ModelSource;

    fn model(id: &str, provider: Provider, modality: Modality, context_length: u32) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            display_name: id.to_string(),
            provider,
            source: ModelSource::Direct,
            is_free: false,
            context_length,
            modality,
            popularity: None,
        }
    }

    #[test]
    fn declared_modality_makes_a_model_multimodal() {
        let caps = capabilities(&model(
            "qwen/qwen-vl-max",
            Provider::OpenRouter,
            Modality::Multimodal,
            32_000,
        ));
        assert!(caps.is_multimodal);
    }

    #[test]
    fn id_markers_make_a_model_multimodal() {
        for id in ["acme/llama-vision", "anthropic/claude-3-haiku", "openai/gpt-4o"] {
            let caps = capabilities(&model(id, Provider::OpenRouter, Modality::Text, 8_000));
            assert!(caps.is_multimodal, "{id} should classify as multimodal");
        }
    }

    #[test]
    fn google_models_are_always_multimodal() {
        let caps = capabilities(&model(
            "google/gemma-7b-it",
            Provider::Google,
            Modality::Text,
            8_000,
        ));
        assert!(caps.is_multimodal);
    }

    #[test]
    fn large_context_threshold_is_inclusive() {
        let at = model("a/m", Provider::OpenRouter, Modality::Text, 128_000);
        let below = model("a/m", Provider::OpenRouter, Modality::Text, 127_999);
        assert!(capabilities(&at).has_large_context);
        assert!(!capabilities(&below).has_large_context);
    }

    #[test]
    fn flagship_substrings_mark_top_tier() {
        let flagship = model(
            "anthropic/claude-3-opus",
            Provider::Anthropic,
            Modality::Multimodal,
            200_000,
        );
        let ordinary = model("acme/tiny-chat", Provider::OpenRouter, Modality::Text, 4_000);
        assert!(capabilities(&flagship).is_top_tier);
        assert!(!capabilities(&ordinary).is_top_tier);
    }

    #[test]
    fn classification_is_stable_across_calls() {
        let descriptor = model(
            "openai/gpt-4o",
            Provider::OpenAi,
            Modality::Multimodal,
            128_000,
        );
        assert_eq!(capabilities(&descriptor), capabilities(&descriptor));
    }
}
