//! Strategy selection
//!
//! A strategy is the ordered list of currently usable models plus the
//! index of the one selected for the next dispatch. Selection is
//! deterministic: the same catalog, preference, and credentials always
//! produce the same list and the same start index.

use std::cmp::Ordering;

use crate::core::catalog::{ModelDescriptor, ModelSource};
use crate::core::providers::{Credentials, LocalServerConfig, Provider};

/// Explicit ordering for a curated set of flagship ids. Lower sorts first.
const DIRECT_MODEL_PRIORITY: &[(&str, u32)] = &[
    ("openai/gpt-4o", 1),
    ("anthropic/claude-3.5-sonnet", 2),
    ("google/gemini-1.5-pro-latest", 3),
    ("anthropic/claude-3-opus", 4),
    ("cohere/command-r+", 5),
    ("openai/gpt-4-turbo", 10),
    ("google/gemini-1.5-flash-latest", 11),
    ("zhipu/glm-4", 12),
    ("mistralai/mistral-large-latest", 13),
    ("moonshot/moonshot-v1-128k", 20),
];

fn priority_of(id: &str) -> Option<u32> {
    DIRECT_MODEL_PRIORITY
        .iter()
        .find(|(priority_id, _)| *priority_id == id)
        .map(|(_, priority)| *priority)
}

/// The economy/balanced/power continuum, derived from the 1-100
/// intelligence preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKey {
    Economy,
    Balanced,
    Power,
}

impl StrategyKey {
    pub fn from_preference(preference: u8) -> StrategyKey {
        if preference <= 33 {
            StrategyKey::Economy
        } else if preference >= 67 {
            StrategyKey::Power
        } else {
            StrategyKey::Balanced
        }
    }
}

/// Canonical catalog ordering: explicit priority entries first (by their
/// priority), then descending popularity, ties broken by ascending id.
pub fn sort_for_display(mut models: Vec<ModelDescriptor>) -> Vec<ModelDescriptor> {
    models.sort_by(|a, b| match (priority_of(&a.id), priority_of(&b.id)) {
        (Some(priority_a), Some(priority_b)) => priority_a.cmp(&priority_b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => {
            let popularity_a = a.popularity.unwrap_or(0.0);
            let popularity_b = b.popularity.unwrap_or(0.0);
            popularity_b
                .total_cmp(&popularity_a)
                .then_with(|| a.id.cmp(&b.id))
        }
    });
    models
}

/// The ordered, usable model list plus the pointer to the model presently
/// selected for dispatch. Invariant: `index` is a valid position, or the
/// list is empty and `index` is zero.
#[derive(Debug, Clone, Default)]
pub struct ModelStrategy {
    models: Vec<ModelDescriptor>,
    index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDirection {
    Next,
    Previous,
}

impl ModelStrategy {
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn current(&self) -> Option<&ModelDescriptor> {
        self.models.get(self.index)
    }

    /// Remember a successful dispatch position. Out-of-range values are
    /// ignored so the index invariant holds.
    pub fn set_index(&mut self, index: usize) {
        if index < self.models.len() {
            self.index = index;
        }
    }

    /// User-forced switching walks the list with wraparound: past the end
    /// goes back to the top, before the start goes to the last entry.
    pub fn switch(&mut self, direction: SwitchDirection) {
        if self.models.is_empty() {
            return;
        }
        self.index = match direction {
            SwitchDirection::Next => {
                if self.index < self.models.len() - 1 {
                    self.index + 1
                } else {
                    0
                }
            }
            SwitchDirection::Previous => {
                if self.index > 0 {
                    self.index - 1
                } else {
                    self.models.len() - 1
                }
            }
        };
    }

    /// The next two models after the current one, shown as the fallback
    /// preview in status displays.
    pub fn fallback_preview(&self) -> &[ModelDescriptor] {
        if self.models.is_empty() {
            return &[];
        }
        let start = (self.index + 1).min(self.models.len());
        let end = (self.index + 3).min(self.models.len());
        &self.models[start..end]
    }
}

/// Whether a credential exists that makes this catalog entry callable.
/// Aggregator-sourced entries are unlocked by the credential that sourced
/// them, direct entries by their own provider's key, and the local model
/// by a configured server.
fn is_usable(
    model: &ModelDescriptor,
    credentials: &Credentials,
    local: &LocalServerConfig,
) -> bool {
    if model.provider == Provider::Local {
        return local.is_configured();
    }
    match model.source {
        ModelSource::Aggregator => {
            if model.provider == Provider::Groq {
                credentials.has(Provider::Groq)
            } else {
                credentials.has(Provider::OpenRouter)
            }
        }
        ModelSource::Direct => credentials.has(model.provider),
    }
}

/// Select the strategy for a preference value over a built catalog.
///
/// The catalog is filtered to usable models (the ordering is preserved)
/// and the start index follows the strategy key: power starts at the top,
/// economy at the first free-tier model (or the top when none exists),
/// balanced a quarter of the way down.
pub fn select_strategy(
    catalog: &[ModelDescriptor],
    preference: u8,
    credentials: &Credentials,
    local: &LocalServerConfig,
) -> ModelStrategy {
    let models: Vec<ModelDescriptor> = catalog
        .iter()
        .filter(|model| is_usable(model, credentials, local))
        .cloned()
        .collect();

    let index = if models.is_empty() {
        0
    } else {
        match StrategyKey::from_preference(preference) {
            StrategyKey::Power => 0,
            StrategyKey::Economy => models
                .iter()
                .position(|model| model.is_free)
                .unwrap_or(0),
            StrategyKey::Balanced => models.len() / 4,
        }
    };

    ModelStrategy { models, index }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::Modality;

    fn model(id: &str, provider: Provider, source: ModelSource) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            display_name: id.to_string(),
            provider,
            source,
            is_free: false,
            context_length: 8_000,
            modality: Modality::Text,
            popularity: None,
        }
    }

    fn aggregated(id: &str, popularity: Option<f64>, is_free: bool) -> ModelDescriptor {
        ModelDescriptor {
            popularity,
            is_free,
            ..model(id, Provider::OpenRouter, ModelSource::Aggregator)
        }
    }

    fn openrouter_credentials() -> Credentials {
        let mut credentials = Credentials::new();
        credentials.set(Provider::OpenRouter, "sk-or-test");
        credentials
    }

    #[test]
    fn strategy_key_thresholds() {
        assert_eq!(StrategyKey::from_preference(1), StrategyKey::Economy);
        assert_eq!(StrategyKey::from_preference(33), StrategyKey::Economy);
        assert_eq!(StrategyKey::from_preference(34), StrategyKey::Balanced);
        assert_eq!(StrategyKey::from_preference(66), StrategyKey::Balanced);
        assert_eq!(StrategyKey::from_preference(67), StrategyKey::Power);
        assert_eq!(StrategyKey::from_preference(100), StrategyKey::Power);
    }

    #[test]
    fn prioritized_ids_sort_before_everything_else() {
        let sorted = sort_for_display(vec![
            aggregated("zzz/popular", Some(9000.0), false),
            model("openai/gpt-4-turbo", Provider::OpenAi, ModelSource::Direct),
            model("openai/gpt-4o", Provider::OpenAi, ModelSource::Direct),
        ]);

        let ids: Vec<&str> = sorted.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["openai/gpt-4o", "openai/gpt-4-turbo", "zzz/popular"]);
    }

    #[test]
    fn popularity_descends_then_id_ascends() {
        let sorted = sort_for_display(vec![
            aggregated("acme/beta", None, false),
            aggregated("acme/alpha", None, false),
            aggregated("acme/hot", Some(5.0), false),
        ]);

        let ids: Vec<&str> = sorted.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["acme/hot", "acme/alpha", "acme/beta"]);
    }

    #[test]
    fn selection_is_deterministic() {
        let catalog = sort_for_display(vec![
            aggregated("acme/a-chat", Some(3.0), true),
            aggregated("acme/b-chat", Some(7.0), false),
            aggregated("acme/c-chat", None, false),
        ]);
        let credentials = openrouter_credentials();
        let local = LocalServerConfig::default();

        let first = select_strategy(&catalog, 50, &credentials, &local);
        let second = select_strategy(&catalog, 50, &credentials, &local);

        let ids = |strategy: &ModelStrategy| {
            strategy
                .models()
                .iter()
                .map(|m| m.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.index(), second.index());
    }

    #[test]
    fn power_starts_at_the_top() {
        let catalog = vec![
            aggregated("acme/a-chat", Some(2.0), false),
            aggregated("acme/b-chat", Some(1.0), true),
        ];
        let strategy = select_strategy(
            &catalog,
            80,
            &openrouter_credentials(),
            &LocalServerConfig::default(),
        );
        assert_eq!(strategy.index(), 0);
    }

    #[test]
    fn economy_starts_at_the_first_free_model() {
        let catalog = vec![
            aggregated("acme/paid-chat", Some(9.0), false),
            aggregated("acme/free-chat", Some(1.0), true),
        ];
        let strategy = select_strategy(
            &catalog,
            20,
            &openrouter_credentials(),
            &LocalServerConfig::default(),
        );

        assert!(!strategy.is_empty());
        let start = &strategy.models()[strategy.index()];
        assert!(start.is_free);
    }

    #[test]
    fn economy_without_free_models_starts_at_the_top() {
        let catalog = vec![
            aggregated("acme/a-chat", Some(2.0), false),
            aggregated("acme/b-chat", Some(1.0), false),
        ];
        let strategy = select_strategy(
            &catalog,
            20,
            &openrouter_credentials(),
            &LocalServerConfig::default(),
        );
        assert_eq!(strategy.index(), 0);
    }

    #[test]
    fn balanced_starts_a_quarter_of_the_way_down() {
        let catalog: Vec<ModelDescriptor> = (0..8)
            .map(|i| aggregated(&format!("acme/model-{i}-chat"), None, false))
            .collect();
        let strategy = select_strategy(
            &catalog,
            50,
            &openrouter_credentials(),
            &LocalServerConfig::default(),
        );
        assert_eq!(strategy.index(), 2);
    }

    #[test]
    fn empty_selection_keeps_index_zero() {
        let strategy = select_strategy(
            &[],
            50,
            &Credentials::new(),
            &LocalServerConfig::default(),
        );
        assert!(strategy.is_empty());
        assert_eq!(strategy.index(), 0);
        assert!(strategy.current().is_none());
    }

    #[test]
    fn unusable_models_are_filtered_out() {
        let catalog = vec![
            model("anthropic/claude-3-opus", Provider::Anthropic, ModelSource::Direct),
            aggregated("acme/open-chat", None, false),
            model("local/local-model", Provider::Local, ModelSource::Direct),
        ];
        let strategy = select_strategy(
            &catalog,
            50,
            &openrouter_credentials(),
            &LocalServerConfig::default(),
        );

        let ids: Vec<&str> = strategy.models().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["acme/open-chat"]);
    }

    #[test]
    fn switching_wraps_in_both_directions() {
        let mut strategy = select_strategy(
            &[
                aggregated("acme/a-chat", Some(3.0), false),
                aggregated("acme/b-chat", Some(2.0), false),
                aggregated("acme/c-chat", Some(1.0), false),
            ],
            80,
            &openrouter_credentials(),
            &LocalServerConfig::default(),
        );
        assert_eq!(strategy.index(), 0);

        strategy.switch(SwitchDirection::Previous);
        assert_eq!(strategy.index(), 2);
        strategy.switch(SwitchDirection::Next);
        assert_eq!(strategy.index(), 0);
        strategy.switch(SwitchDirection::Next);
        assert_eq!(strategy.index(), 1);
    }

    #[test]
    fn fallback_preview_lists_the_next_two_models() {
        let strategy = select_strategy(
            &[
                aggregated("acme/a-chat", Some(3.0), false),
                aggregated("acme/b-chat", Some(2.0), false),
                aggregated("acme/c-chat", Some(1.0), false),
            ],
            80,
            &openrouter_credentials(),
            &LocalServerConfig::default(),
        );

        let preview: Vec<&str> = strategy
            .fallback_preview()
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(preview, ["acme/b-chat", "acme/c-chat"]);
    }
}
