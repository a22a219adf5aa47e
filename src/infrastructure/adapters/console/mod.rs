//! Console adapter for development/testing
//!
//! Reads lines from stdin as the single console user. `:server <id>` and
//! `:dm` switch where messages are posted; while a conversation is open,
//! lines are collected until one containing only `.`.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use crate::application::errors::BotError;
use crate::application::messaging::{ConversationRouter, MessageDispatcher};
use crate::domain::entities::User;
use crate::domain::traits::{Bot, BotInfo};

const CONSOLE_CHANNEL: &str = "console";

/// Console bot adapter for local development
pub struct ConsoleAdapter {
    info: BotInfo,
    user: User,
}

/// What a console line means, given where the console currently is
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    SwitchServer(&'a str),
    SwitchDirect,
    Quit,
    Message(&'a str),
    Blank,
}

fn classify(line: &str) -> Line<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    match line.split_once(char::is_whitespace) {
        Some((":server", id)) if !id.trim().is_empty() => Line::SwitchServer(id.trim()),
        _ if line == ":dm" => Line::SwitchDirect,
        _ if line == ":quit" => Line::Quit,
        _ => Line::Message(line),
    }
}

impl ConsoleAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: BotInfo {
                id: "console".to_string(),
                name: name.into(),
                username: "console".to_string(),
            },
            user: User::new("console").with_username("console"),
        }
    }

    /// The user every console line is sent as
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Read stdin until EOF or `:quit`, dispatching each message on its own task
    pub async fn run(
        self: Arc<Self>,
        dispatcher: Arc<MessageDispatcher>,
        router: Arc<ConversationRouter>,
        server_id: Option<String>,
    ) -> Result<(), BotError> {
        let mut server_id = server_id;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut pending: Vec<String> = Vec::new();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| BotError::Network(format!("Failed to read stdin: {}", e)))?
        {
            if router.is_waiting(&self.user.id) {
                if line.trim() == "." {
                    router.offer(&self.user.id, pending.join("\n"));
                    pending.clear();
                } else {
                    pending.push(line);
                }
                continue;
            }

            match classify(&line) {
                Line::Blank => {}
                Line::Quit => break,
                Line::SwitchServer(id) => {
                    server_id = Some(id.to_string());
                    println!("[console] now in server {}", id);
                }
                Line::SwitchDirect => {
                    server_id = None;
                    println!("[console] now in direct messages");
                }
                Line::Message(text) => {
                    let bot = self.clone();
                    let dispatcher = dispatcher.clone();
                    let server = server_id.clone();
                    let text = text.to_string();
                    tokio::spawn(async move {
                        let reply = dispatcher
                            .process_text(CONSOLE_CHANNEL, server.as_deref(), bot.user.clone(), &text)
                            .await;
                        match reply {
                            Ok(Some(reply)) => {
                                let _ = bot.send_message(CONSOLE_CHANNEL, &reply).await;
                            }
                            Ok(None) => {}
                            Err(e) => {
                                error!("Failed to handle '{}': {}", text, e);
                                let _ = bot.send_message(CONSOLE_CHANNEL, &format!("Error: {}", e)).await;
                            }
                        }
                    });
                }
            }
        }

        info!("Console input closed");
        Ok(())
    }
}

#[async_trait]
impl Bot for ConsoleAdapter {
    async fn start(&self) -> Result<(), BotError> {
        info!("Starting console bot (dev mode)");
        Ok(())
    }

    async fn send_message(&self, _channel_id: &str, text: &str) -> Result<String, BotError> {
        println!("[BOT] {}", text);
        Ok("console_msg".to_string())
    }

    async fn send_direct(&self, user_id: &str, text: &str) -> Result<String, BotError> {
        println!("[BOT -> {}] {}", user_id, text);
        if user_id == self.user.id {
            println!("[console] end your reply with a line containing only '.'");
        }
        Ok("console_dm".to_string())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_lines() {
        assert_eq!(classify(":server 42"), Line::SwitchServer("42"));
        assert_eq!(classify(":dm"), Line::SwitchDirect);
        assert_eq!(classify("  :quit "), Line::Quit);
        assert_eq!(classify("!ping"), Line::Message("!ping"));
        assert_eq!(classify(":server"), Line::Message(":server"));
        assert_eq!(classify("   "), Line::Blank);
    }
}
