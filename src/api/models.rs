//! Remote catalog fetchers
//!
//! Both feeds fail soft: a network or decode error degrades to an empty
//! list so the client keeps working with whatever is locally derivable.
//! The ranked listing is fetched at most once per process.

use tokio::sync::OnceCell;
use tracing::warn;

use crate::api::{FreemiumWhitelist, RankedModel, RankedModelsResponse};

pub const RANKED_MODELS_URL: &str = "https://openrouter.ai/api/v1/models";
pub const FREEMIUM_WHITELIST_URL: &str =
    "https://raw.githubusercontent.com/filokloi/ai-chain-config/refs/heads/main/priority_models.json";

static RANKED_MODELS: OnceCell<Vec<RankedModel>> = OnceCell::const_new();
static FREEMIUM_IDS: OnceCell<Vec<String>> = OnceCell::const_new();

/// Fetch the aggregator's ranked model listing, caching the result (or the
/// empty list a failure degrades to) for the lifetime of the process.
pub async fn ranked_models(client: &reqwest::Client) -> &'static [RankedModel] {
    RANKED_MODELS
        .get_or_init(|| async {
            match fetch_ranked_models(client).await {
                Ok(models) => models,
                Err(err) => {
                    warn!("could not fetch ranked model listing: {err}");
                    Vec::new()
                }
            }
        })
        .await
}

async fn fetch_ranked_models(
    client: &reqwest::Client,
) -> Result<Vec<RankedModel>, Box<dyn std::error::Error>> {
    let response = client
        .get(RANKED_MODELS_URL)
        .header("Content-Type", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(format!("model listing request failed with status {status}: {error_text}").into());
    }

    let listing = response.json::<RankedModelsResponse>().await?;
    Ok(listing.data)
}

/// Fetch the curated freemium whitelist, caching like [`ranked_models`].
pub async fn freemium_whitelist(client: &reqwest::Client) -> &'static [String] {
    FREEMIUM_IDS
        .get_or_init(|| async {
            match fetch_freemium_whitelist(client).await {
                Ok(ids) => ids,
                Err(err) => {
                    warn!("could not fetch freemium whitelist: {err}");
                    Vec::new()
                }
            }
        })
        .await
}

async fn fetch_freemium_whitelist(
    client: &reqwest::Client,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let response = client
        .get(FREEMIUM_WHITELIST_URL)
        .header("Cache-Control", "no-store")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(format!(
            "whitelist request failed with status {}",
            response.status()
        )
        .into());
    }

    let feed = response.json::<FreemiumWhitelist>().await?;
    Ok(feed.freemium_whitelist)
}
