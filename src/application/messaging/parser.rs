//! Message parser - Parses raw messages into structured messages

use crate::domain::entities::{Content, Message, MessageType, User};

/// Parses incoming messages into structured Message objects
pub struct MessageParser {
    command_prefix: String,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.command_prefix
    }

    /// Parse a text message posted in `server_id`, or a direct message when `None`
    pub fn parse(
        &self,
        channel_id: impl Into<String>,
        server_id: Option<&str>,
        sender: Option<User>,
        text: impl Into<String>,
    ) -> Message {
        let text = text.into();
        let mut message = match text.strip_prefix(self.command_prefix.as_str()) {
            Some(rest) => Self::parse_command(channel_id.into(), rest),
            None if text.trim().is_empty() => Message::new(channel_id, Content::Empty),
            None => Message::from_text(channel_id, text),
        };

        match server_id {
            Some(id) => message = message.with_server(id),
            None if !message.content.is_command() => message.message_type = MessageType::Direct,
            None => {}
        }
        if let Some(user) = sender {
            message = message.with_sender(user);
        }
        message
    }

    fn parse_command(channel_id: String, cmd_text: &str) -> Message {
        // Split command and arguments
        let mut parts = cmd_text.split_whitespace();
        let name = parts.next().unwrap_or_default().to_string();
        let args = parts.map(str::to_string).collect();

        if name.is_empty() {
            return Message::new(channel_id, Content::Empty);
        }
        Message::from_command(channel_id, name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_with_args() {
        let parser = MessageParser::new("!");
        let msg = parser.parse("c1", Some("42"), Some(User::new("7")), "!enable  weather");
        assert_eq!(msg.content.command_name(), Some("enable"));
        assert_eq!(msg.args(), ["weather"]);
        assert_eq!(msg.server_id.as_deref(), Some("42"));
        assert_eq!(msg.message_type, MessageType::Command);
        assert_eq!(msg.sender.unwrap().id, "7");
    }

    #[test]
    fn test_parse_plain_and_direct_text() {
        let parser = MessageParser::new("!");
        let msg = parser.parse("c1", Some("42"), None, "hello there");
        assert_eq!(msg.content.text(), Some("hello there"));
        assert_eq!(msg.message_type, MessageType::Text);

        let dm = parser.parse("dm", None, None, "hello");
        assert!(dm.is_direct());
        assert_eq!(dm.message_type, MessageType::Direct);
    }

    #[test]
    fn test_bare_prefix_is_empty() {
        let parser = MessageParser::new("!");
        assert_eq!(parser.parse("c1", None, None, "!  ").content, Content::Empty);
    }
}
