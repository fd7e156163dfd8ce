//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments and dispatches into the
//! interactive chat shell, the one-shot `say` command, and the model
//! listing.

pub mod chat;
pub mod model_list;
pub mod say;

use std::error::Error;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::api::models::{freemium_whitelist, ranked_models};
use crate::api::RankedModel;
use crate::core::config::Settings;
use crate::core::providers::{Credentials, Provider};

/// Per-request timeout on the shared HTTP client. A hung provider
/// surfaces as a provider failure and triggers failover instead of
/// blocking the turn forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "relais")]
#[command(about = "A chat client that relays across AI providers with automatic failover")]
#[command(
    long_about = "Relais converses with remote LLM providers and automatically falls over to \
the next usable model when the active one fails. The model list is built from \
your configured API keys and the aggregator's ranked catalog, and the starting \
model follows your intelligence preference (economy, balanced, or power).\n\n\
Configuration:\n\
  relais set <provider> <api-key>   Store an API key (openrouter, groq, google, openai,\n\
                                    anthropic, cohere, mistral, xai, alibaba, zhipu, moonshot)\n\
  relais set intelligence <1-100>   Set the intelligence preference\n\
  relais set local-url <url>        Point at a local OpenAI-compatible server\n\n\
Chat commands:\n\
  /models           List the current model strategy\n\
  /next, /prev      Force-switch the active model (wraps around)\n\
  /intelligence <n> Change the preference and rebuild the strategy\n\
  /new              Start a fresh conversation\n\
  /clear            Delete all conversation history\n\
  /quit             Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat shell (default)
    Chat,
    /// Send a single prompt and print the reply
    Say {
        /// The prompt to send
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// List the model strategy built from your credentials
    Models,
    /// Set a configuration value (an API key, `intelligence`,
    /// `local-url`, or `local-key`)
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key
        value: String,
    },
    /// Unset a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

pub async fn run() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let args = Args::parse();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => chat::run_chat().await,
        Commands::Say { prompt } => say::run_say(prompt).await,
        Commands::Models => model_list::list_models().await,
        Commands::Set { key, value } => set_value(&key, value),
        Commands::Unset { key } => unset_value(&key),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

pub(crate) fn http_client() -> Result<reqwest::Client, Box<dyn Error>> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Fetch the remote feeds when an aggregator-style credential is present.
/// Both fetches are cached for the process lifetime and fail soft.
pub(crate) async fn remote_feeds(
    client: &reqwest::Client,
    credentials: &Credentials,
) -> (&'static [RankedModel], &'static [String]) {
    if credentials.has(Provider::OpenRouter) || credentials.has(Provider::Groq) {
        (
            ranked_models(client).await,
            freemium_whitelist(client).await,
        )
    } else {
        (&[], &[])
    }
}

fn provider_from_key(key: &str) -> Option<Provider> {
    Provider::ALL
        .into_iter()
        .find(|provider| provider.as_str() == key)
}

fn set_value(key: &str, value: String) -> Result<(), Box<dyn Error>> {
    let mut settings = Settings::load()?;
    if let Some(provider) = provider_from_key(key) {
        settings.credentials.set(provider, value);
        settings.save()?;
        println!("✅ Stored API key for {}", provider.display_name());
        return Ok(());
    }
    match key {
        "intelligence" => {
            let preference: u8 = value
                .parse()
                .map_err(|_| format!("intelligence must be a number from 1 to 100, got '{value}'"))?;
            settings.set_intelligence(preference);
            settings.save()?;
            println!("✅ Set intelligence to {}", settings.intelligence);
        }
        "local-url" => {
            settings.local_server.base_url = value;
            settings.save()?;
            println!("✅ Set local server URL");
        }
        "local-key" => {
            settings.local_server.api_key = value;
            settings.save()?;
            println!("✅ Set local server API key");
        }
        _ => {
            return Err(format!(
                "Unknown configuration key '{key}'. Use a provider id, 'intelligence', 'local-url', or 'local-key'."
            )
            .into())
        }
    }
    Ok(())
}

fn unset_value(key: &str) -> Result<(), Box<dyn Error>> {
    let mut settings = Settings::load()?;
    if let Some(provider) = provider_from_key(key) {
        settings.credentials.remove(provider);
        settings.save()?;
        println!("✅ Removed API key for {}", provider.display_name());
        return Ok(());
    }
    match key {
        "local-url" => {
            settings.local_server.base_url = String::new();
            settings.save()?;
            println!("✅ Cleared local server URL");
        }
        "local-key" => {
            settings.local_server.api_key = String::new();
            settings.save()?;
            println!("✅ Cleared local server API key");
        }
        _ => return Err(format!("Unknown configuration key '{key}'.").into()),
    }
    Ok(())
}
