//! Message dispatcher - Routes messages to handlers

use std::sync::Arc;
use tracing::debug;

use crate::application::errors::{BotError, CommandError};
use crate::application::services::{AdminCommands, LifecycleCoordinator};
use crate::domain::entities::{Invocation, Message, User};
use crate::infrastructure::storage::CommandOwner;
use super::middleware::{Context, Middleware, MiddlewareError, Next};
use super::parser::MessageParser;

/// Handler result; `None` when the message needs no reply
pub type HandlerResult = Result<Option<String>, BotError>;

/// Message dispatcher - routes messages through middleware to handlers
pub struct MessageDispatcher {
    parser: MessageParser,
    middleware: Vec<Arc<dyn Middleware>>,
    coordinator: Arc<LifecycleCoordinator>,
    admin: Arc<AdminCommands>,
}

impl MessageDispatcher {
    pub fn new(prefix: impl Into<String>, admin: Arc<AdminCommands>) -> Self {
        Self {
            parser: MessageParser::new(prefix),
            middleware: Vec::new(),
            coordinator: admin.coordinator().clone(),
            admin,
        }
    }

    /// Add middleware to the chain
    pub fn with_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn parser(&self) -> &MessageParser {
        &self.parser
    }

    /// Process a raw text message
    pub async fn process_text(
        &self,
        channel_id: &str,
        server_id: Option<&str>,
        sender: User,
        text: &str,
    ) -> HandlerResult {
        let message = self.parser.parse(channel_id, server_id, Some(sender), text);
        self.process(message).await
    }

    /// Process a message through the dispatcher
    pub async fn process(&self, message: Message) -> HandlerResult {
        if !message.content.is_command() {
            return Ok(None);
        }

        let ctx = match Next::new(self.middleware.clone()).run(Context::new(message)) {
            Ok(ctx) => ctx,
            Err(MiddlewareError::Blocked(msg)) => return Ok(Some(msg)),
            Err(MiddlewareError::RateLimited { .. }) => {
                return Ok(Some("Rate limited. Please try again later.".to_string()))
            }
            Err(MiddlewareError::PermissionDenied(msg)) => {
                return Ok(Some(format!("Permission denied: {}", msg)))
            }
            Err(MiddlewareError::Internal(msg)) => return Err(BotError::Internal(msg)),
        };

        match self.run_handler(&ctx).await {
            Err(BotError::PermissionDenied(msg)) => Ok(Some(format!("Permission denied: {}", msg))),
            result => result,
        }
    }

    /// Run the command after middleware
    async fn run_handler(&self, ctx: &Context) -> HandlerResult {
        let Some(name) = ctx.message.content.command_name() else {
            return Ok(None);
        };

        if let Some(info) = self.coordinator.registry().descriptions().lookup(name) {
            if info.owner == CommandOwner::Bot {
                return self.admin.handle(&info.handler, name, &ctx.message).await.map(Some);
            }
        }

        if let Some(resolved) = self.coordinator.registry().resolve(name) {
            if self.is_available(&resolved.owner, ctx) {
                let invocation = Invocation::new(name, ctx.message.clone());
                return match resolved.command.execute(&invocation) {
                    Ok(reply) => Ok(Some(reply)),
                    Err(CommandError::InvalidArgs(help)) => Ok(Some(help)),
                    Err(e) => Err(BotError::Command(e)),
                };
            }
            debug!("[{}] '{}' is not enabled here", ctx.channel_id, resolved.owner);
        }

        Ok(Some(format!("Unknown command: {}{}", self.parser.prefix(), name)))
    }

    /// Base extension commands run everywhere; others only where enabled
    fn is_available(&self, owner: &str, ctx: &Context) -> bool {
        owner == self.coordinator.base() || (ctx.server_id.is_some() && ctx.is_enabled(owner))
    }
}
