//! One-shot "say" command

use std::error::Error;

use crate::cli::{http_client, remote_feeds};
use crate::core::config::Settings;
use crate::core::dispatch::HttpDispatcher;
use crate::core::session::ChatSession;
use crate::core::store::ChatStore;

pub async fn run_say(prompt: Vec<String>) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.is_empty() {
        eprintln!("Usage: relais say <prompt>");
        std::process::exit(1);
    }

    let settings = Settings::load()?;
    let store = ChatStore::load()?;
    let client = http_client()?;
    let mut session = ChatSession::new(HttpDispatcher::new(client.clone()), settings, store);

    let (remote, whitelist) = remote_feeds(&client, &session.settings().credentials).await;
    session.rebuild_strategy(remote, whitelist);

    if session.strategy().is_empty() {
        return Err(
            "No usable models. Configure an API key with 'relais set <provider> <key>'.".into(),
        );
    }

    session.store_mut().create_chat()?;
    let before = 1;
    session.send(prompt, Vec::new()).await?;

    if let Some(chat) = session.store().active() {
        for message in chat.messages.iter().skip(before) {
            if let Some(content) = &message.content {
                println!("{content}");
            }
        }
    }
    Ok(())
}
