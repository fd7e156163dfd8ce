//! Interactive chat shell
//!
//! A plain line-based loop over [`ChatSession`]. Rendering stays minimal
//! on purpose; the interesting behavior (strategy, failover, persistence)
//! lives in the core.

use std::error::Error;
use std::io::{self, BufRead, Write};

use crate::cli::{http_client, remote_feeds};
use crate::core::config::Settings;
use crate::core::dispatch::HttpDispatcher;
use crate::core::session::ChatSession;
use crate::core::store::ChatStore;
use crate::core::strategy::SwitchDirection;

pub async fn run_chat() -> Result<(), Box<dyn Error>> {
    let mut settings = Settings::load()?;
    if !settings.onboarded {
        println!("Welcome to relais. Store an API key with 'relais set <provider> <key>',");
        println!("then come back here to chat. Type /help inside the chat for commands.");
        settings.onboarded = true;
        settings.save()?;
    }

    let store = ChatStore::load()?;
    let client = http_client()?;
    let mut session = ChatSession::new(HttpDispatcher::new(client.clone()), settings, store);

    let (remote, whitelist) = remote_feeds(&client, &session.settings().credentials).await;
    session.rebuild_strategy(remote, whitelist);

    match session.strategy().current() {
        Some(model) => {
            println!(
                "Chatting with {} ({} models available)",
                model.id,
                session.strategy().len()
            );
            print_fallbacks(&session);
        }
        None => println!("No usable models. Configure an API key with 'relais set <provider> <key>'."),
    }

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(command, &mut session, &client).await? {
                break;
            }
            continue;
        }

        let before = session
            .store()
            .active()
            .map(|chat| chat.messages.len())
            .unwrap_or(0);
        match session.send(line, Vec::new()).await {
            Ok(_) => print_new_replies(&session, before + 1),
            Err(err) => eprintln!("Error: {err}"),
        }
    }

    Ok(())
}

/// Returns false when the loop should exit.
async fn handle_command(
    command: &str,
    session: &mut ChatSession<HttpDispatcher>,
    client: &reqwest::Client,
) -> Result<bool, Box<dyn Error>> {
    let mut parts = command.split_whitespace();
    match parts.next().unwrap_or_default() {
        "quit" | "exit" => return Ok(false),
        "new" => {
            session.store_mut().create_chat()?;
            println!("Started a new conversation.");
        }
        "models" => {
            for (index, model) in session.strategy().models().iter().enumerate() {
                let marker = if index == session.strategy().index() {
                    "→"
                } else {
                    " "
                };
                println!("{marker} {index:3}  {}", model.id);
            }
        }
        "next" => {
            session.switch_model(SwitchDirection::Next);
            if let Some(model) = session.strategy().current() {
                println!("Switched to {}", model.id);
                print_fallbacks(session);
            }
        }
        "prev" => {
            session.switch_model(SwitchDirection::Previous);
            if let Some(model) = session.strategy().current() {
                println!("Switched to {}", model.id);
                print_fallbacks(session);
            }
        }
        "clear" => {
            session.store_mut().clear_history()?;
            println!("History cleared.");
        }
        "intelligence" => match parts.next().and_then(|value| value.parse::<u8>().ok()) {
            Some(preference) => {
                let mut settings = Settings::load()?;
                settings.set_intelligence(preference);
                settings.save()?;
                session.update_settings(settings);
                let (remote, whitelist) =
                    remote_feeds(client, &session.settings().credentials).await;
                session.rebuild_strategy(remote, whitelist);
                match session.strategy().current() {
                    Some(model) => println!("Strategy rebuilt; starting at {}", model.id),
                    None => println!("Strategy rebuilt; no usable models."),
                }
            }
            None => println!("Usage: /intelligence <1-100>"),
        },
        "help" => {
            println!("/models  /next  /prev  /intelligence <n>  /new  /clear  /quit");
        }
        other => println!("Unknown command '/{other}'. Try /help."),
    }
    Ok(true)
}

fn print_fallbacks(session: &ChatSession<HttpDispatcher>) {
    let preview = session.strategy().fallback_preview();
    if !preview.is_empty() {
        let names: Vec<&str> = preview.iter().map(|model| model.id.as_str()).collect();
        println!("Fallbacks: {}", names.join(", "));
    }
}

fn print_new_replies(session: &ChatSession<HttpDispatcher>, from: usize) {
    let Some(chat) = session.store().active() else {
        return;
    };
    for message in chat.messages.iter().skip(from) {
        let label = message.model.as_deref().unwrap_or("relais");
        match &message.content {
            Some(content) => println!("[{label}] {content}"),
            None => println!("[{label}] (requested {} tool call(s))", message.tool_calls.len()),
        }
    }
}
