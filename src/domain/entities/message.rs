use super::User;
use chrono::{DateTime, Utc};

/// Where a message was sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    /// Posted in a server channel
    Text,
    /// Parsed as a bot command
    Command,
    /// Direct message to the bot, outside any server
    Direct,
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Text => "text",
            MessageType::Command => "command",
            MessageType::Direct => "direct",
        }
    }
}

/// Message content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Command { name: String, args: Vec<String> },
    Empty,
}

impl Content {
    pub fn text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self, Content::Command { .. })
    }

    pub fn command_name(&self) -> Option<&str> {
        match self {
            Content::Command { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// An incoming message
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    /// Server the message was posted in; `None` for direct messages
    pub server_id: Option<String>,
    pub sender: Option<User>,
    pub content: Content,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(channel_id: impl Into<String>, content: Content) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            server_id: None,
            sender: None,
            content,
            message_type: MessageType::Text,
            timestamp: Utc::now(),
        }
    }

    pub fn from_text(channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(channel_id, Content::Text(text.into()))
    }

    pub fn from_command(channel_id: impl Into<String>, name: impl Into<String>, args: Vec<String>) -> Self {
        let mut msg = Self::new(channel_id, Content::Command { name: name.into(), args });
        msg.message_type = MessageType::Command;
        msg
    }

    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    pub fn with_sender(mut self, user: User) -> Self {
        self.sender = Some(user);
        self
    }

    pub fn is_direct(&self) -> bool {
        self.server_id.is_none()
    }

    pub fn args(&self) -> &[String] {
        match &self.content {
            Content::Command { args, .. } => args,
            _ => &[],
        }
    }
}
