//! The base extension, loaded for every server and never disableable

use chrono::Utc;

use crate::domain::entities::Command;
use super::trait_def::{ExtensionModule, SetupContext};

pub const BASE_EXTENSION: &str = "general";

#[derive(Default)]
pub struct General;

pub fn create() -> Box<dyn ExtensionModule> {
    Box::new(General)
}

impl ExtensionModule for General {
    fn name(&self) -> &str {
        BASE_EXTENSION
    }

    fn setup(&mut self, ctx: &mut SetupContext) -> Result<(), String> {
        ctx.register(
            Command::new("ping")
                .with_description("Check the bot's latency.")
                .with_handler(|inv| {
                    let latency = (Utc::now() - inv.message.timestamp).num_milliseconds().max(0);
                    Ok(format!("Pong! Latency: {}ms", latency))
                }),
        )?;

        ctx.register(
            Command::new("info")
                .with_description("Display bot information.")
                .with_handler(|inv| {
                    Ok(format!(
                        "odin-bot v{}\nServer: {}",
                        env!("CARGO_PKG_VERSION"),
                        inv.server_id().unwrap_or("direct messages"),
                    ))
                }),
        )?;

        let descriptions = ctx.descriptions();
        ctx.register(
            Command::new("help")
                .with_description("List commands and what they do.")
                .with_handler(move |_| {
                    let mut help = String::from("Available commands:\n");
                    for (owner, commands) in descriptions.sections() {
                        if commands.is_empty() {
                            continue;
                        }
                        help.push_str(&format!("[{}]\n", owner));
                        for command in commands {
                            help.push_str(&format!("  {} - {}\n", command.name, command.description));
                            if let Some(usage) = &command.usage {
                                help.push_str(&format!("      usage: {}\n", usage));
                            }
                        }
                    }
                    Ok(help)
                }),
        )
    }
}
