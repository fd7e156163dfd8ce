//! Model listing functionality
//!
//! Prints the strategy that would be used for a chat right now: the
//! ordered usable models, the starting position for the configured
//! intelligence preference, and capability badges.

use std::error::Error;

use crate::cli::{http_client, remote_feeds};
use crate::core::capabilities::capabilities;
use crate::core::catalog::build_catalog;
use crate::core::config::Settings;
use crate::core::strategy::{select_strategy, StrategyKey};

pub async fn list_models() -> Result<(), Box<dyn Error>> {
    let settings = Settings::load()?;
    let client = http_client()?;

    let (remote, whitelist) = remote_feeds(&client, &settings.credentials).await;
    let catalog = build_catalog(&settings.credentials, &settings.local_server, remote, whitelist);
    let strategy = select_strategy(
        &catalog,
        settings.intelligence,
        &settings.credentials,
        &settings.local_server,
    );

    let key = match StrategyKey::from_preference(settings.intelligence) {
        StrategyKey::Economy => "economy",
        StrategyKey::Balanced => "balanced",
        StrategyKey::Power => "power",
    };
    println!(
        "🤖 Model strategy ({} models, {key} @ intelligence {})",
        strategy.len(),
        settings.intelligence
    );
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if strategy.is_empty() {
        println!("(no usable models; store an API key with 'relais set <provider> <key>')");
        return Ok(());
    }

    for (index, model) in strategy.models().iter().enumerate() {
        let marker = if index == strategy.index() { "→" } else { " " };
        let caps = capabilities(model);
        let mut badges = String::new();
        if model.is_free {
            badges.push_str(" [free]");
        }
        if caps.is_multimodal {
            badges.push_str(" [vision]");
        }
        if caps.has_large_context {
            badges.push_str(" [128k+]");
        }
        if caps.is_top_tier {
            badges.push_str(" [top]");
        }
        println!("{marker} {index:3}  {}{badges}", model.id);
    }

    Ok(())
}
