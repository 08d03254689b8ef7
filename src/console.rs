use std::error::Error;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use log::{ info, warn };
use tokio::io::AsyncBufReadExt;

use crate::api::ApiClient;
use crate::chat::{ ChatWidget, FailurePolicy, StreamingChatClient };
use crate::cli::Args;
use crate::feed::{ FeedUpdate, ObserverFeed };
use crate::models::resources::Chatbot;
use crate::models::session::Role;
use crate::selection::{ SelectedChatbot, SelectionStore };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Observe,
    Chat,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseModeError {
    message: String,
}

impl fmt::Display for ParseModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseModeError {}

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "observe" => Ok(Mode::Observe),
            "chat" => Ok(Mode::Chat),
            _ =>
                Err(ParseModeError {
                    message: format!("Invalid console mode: '{}'", s),
                }),
        }
    }
}

/// The feed endpoint lives on the same host as the REST API, one scheme over.
pub fn derive_ws_base(api_base: &str) -> String {
    api_base.replacen("http", "ws", 1)
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mode: Mode = args.mode.parse()?;
    let policy: FailurePolicy = args.failure_policy.parse()?;
    let ws_base = args.ws_base.clone().unwrap_or_else(|| derive_ws_base(&args.api_base));

    let api = ApiClient::new(args.api_base.clone(), args.auth_token.clone());
    let selection_store = SelectionStore::new(&args.selection_path);
    let chatbot = resolve_chatbot(&api, &args, &selection_store).await?;
    info!("Scoped to chatbot '{}' ({})", chatbot.name, chatbot.id);

    match mode {
        Mode::Observe => observe(&api, &ws_base, &chatbot).await,
        Mode::Chat => chat(&args, policy, &chatbot).await,
    }
}

/// Pick the chatbot the console is scoped to: explicit flag first, then the
/// persisted selection, then the first bot in the organization.
async fn resolve_chatbot(
    api: &ApiClient,
    args: &Args,
    selection_store: &SelectionStore
) -> Result<Chatbot, Box<dyn Error + Send + Sync>> {
    let chatbots = api.chatbots().await?;
    if chatbots.is_empty() {
        return Err("No chatbots found for this organization".into());
    }

    let chosen = if let Some(wanted) = &args.chatbot_id {
        chatbots
            .iter()
            .find(|b| &b.id == wanted)
            .cloned()
            .ok_or_else(|| format!("Chatbot '{}' not found", wanted))?
    } else if
        let Some(saved) = selection_store
            .load()
            .and_then(|s| chatbots.iter().find(|b| b.id == s.id).cloned())
    {
        saved
    } else {
        chatbots[0].clone()
    };

    if
        let Err(e) = selection_store.save(
            &(SelectedChatbot { id: chosen.id.clone(), name: chosen.name.clone() })
        )
    {
        warn!("Failed to persist chatbot selection: {}", e);
    }
    Ok(chosen)
}

/// Live transcript view: seed from REST, then fold feed events until Ctrl-C
/// or the feed drops. No automatic reconnect; rerun to resubscribe.
async fn observe(
    api: &ApiClient,
    ws_base: &str,
    chatbot: &Chatbot
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut feed = ObserverFeed::new(ws_base);
    feed.switch(&chatbot.id).await?;

    match api.sessions(&chatbot.id).await {
        Ok(sessions) => {
            info!("Seeded {} existing sessions", sessions.len());
            if let Some(handle) = feed.handle() {
                handle.seed(sessions);
            }
        }
        Err(e) => warn!("Failed to fetch existing sessions: {}", e),
    }

    let mut updates = feed
        .handle_mut()
        .and_then(|h| h.updates())
        .ok_or("Feed connection yielded no update channel")?;

    println!("-- Observing live sessions for '{}' (Ctrl-C to stop) --", chatbot.name);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("-- Stopping --");
                break;
            }
            update = updates.recv() => {
                match update {
                    Some(FeedUpdate::SessionChanged { session_id }) => {
                        if let Some(handle) = feed.handle() {
                            let line = handle.with_sessions(|store| {
                                store.get(&session_id).map(|session| {
                                    match session.last_message() {
                                        Some(msg) => format!(
                                            "[{}] {} ({}, {:?}) {:?}: {}",
                                            msg.timestamp,
                                            session.id,
                                            session.client_name,
                                            session.status,
                                            msg.role,
                                            msg.content
                                        ),
                                        None => format!(
                                            "[{}] {} ({}) is now {:?}",
                                            session.start_time,
                                            session.id,
                                            session.client_name,
                                            session.status
                                        ),
                                    }
                                })
                            });
                            if let Some(line) = line {
                                println!("{}", line);
                            }
                        }
                    }
                    Some(FeedUpdate::Disconnected) | None => {
                        println!("-- Feed disconnected; last known state retained --");
                        break;
                    }
                }
            }
        }
    }

    feed.disconnect().await;
    Ok(())
}

/// Interactive chat against the selected bot, streaming tokens to stdout as
/// they arrive. Empty line or EOF ends the conversation.
async fn chat(
    args: &Args,
    policy: FailurePolicy,
    chatbot: &Chatbot
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let api_key = args.chat_api_key.clone().or_else(|| chatbot.preview_api_key.clone());

    let transport = StreamingChatClient::new(args.api_base.clone());
    let mut widget = ChatWidget::new(transport, policy);
    widget.set_chatbot(&chatbot.id, api_key);
    widget.greet(&chatbot.name);
    if let Some(greeting) = widget.messages().first() {
        println!("{}: {}", chatbot.name, greeting.content);
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        if line.trim().is_empty() {
            break;
        }

        print!("{}: ", chatbot.name);
        std::io::stdout().flush()?;
        let mut streamed = false;
        widget.send(&line, |delta| {
            streamed = true;
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        }).await;

        // Failures surface as synthetic transcript messages rather than
        // deltas; show whatever the widget recorded in that case.
        if !streamed {
            if let Some(last) = widget.messages().last() {
                if last.role == Role::Assistant {
                    print!("{}", last.content);
                }
            }
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_base_derivation_swaps_scheme() {
        assert_eq!(derive_ws_base("http://localhost:8000"), "ws://localhost:8000");
        assert_eq!(derive_ws_base("https://api.example.com"), "wss://api.example.com");
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("observe".parse::<Mode>().unwrap(), Mode::Observe);
        assert_eq!("CHAT".parse::<Mode>().unwrap(), Mode::Chat);
        assert!("dashboard".parse::<Mode>().is_err());
    }
}
