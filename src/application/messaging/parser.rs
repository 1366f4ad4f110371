//! Message parser - Parses raw text lines into structured messages

use crate::domain::entities::{Content, Message};

/// Parses incoming text into Message objects
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

    /// Parse a text message
    pub fn parse(&self, chat_id: impl Into<String>, text: impl Into<String>, sender: Option<String>) -> Message {
        let text = text.into();
        let trimmed = text.trim();

        let content = if trimmed.is_empty() {
            Content::Empty
        } else if let Some(rest) = self.strip_prefix(trimmed) {
            Self::parse_command(rest)
        } else {
            Content::Text(text)
        };

        let message = Message::new(chat_id, content);
        match sender {
            Some(sender) => message.with_sender(sender),
            None => message,
        }
    }

    fn strip_prefix<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.strip_prefix('/').or_else(|| {
            if self.command_prefix.is_empty() {
                None
            } else {
                text.strip_prefix(self.command_prefix.as_str())
            }
        })
    }

    fn parse_command(text: &str) -> Content {
        let mut parts = text.split_whitespace();
        // A prefix with nothing after it carries no command.
        let Some(name) = parts.next() else {
            return Content::Empty;
        };
        let args = parts.map(str::to_string).collect();

        Content::Command { name: name.to_lowercase(), args }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_text() {
        let parser = MessageParser::new("!");
        let message = parser.parse("console", "hello there", Some("alice".to_string()));

        assert_eq!(message.content, Content::Text("hello there".to_string()));
        assert_eq!(message.sender.as_deref(), Some("alice"));
    }

    #[test]
    fn test_parse_command_with_either_prefix() {
        let parser = MessageParser::new("!");

        let slash = parser.parse("console", "/module load ping 1.0.0", None);
        assert_eq!(
            slash.content,
            Content::Command {
                name: "module".to_string(),
                args: vec!["load".to_string(), "ping".to_string(), "1.0.0".to_string()],
            }
        );

        let bang = parser.parse("console", "!Help", None);
        assert_eq!(bang.content, Content::Command { name: "help".to_string(), args: vec![] });
    }

    #[test]
    fn test_parse_blank_line() {
        let parser = MessageParser::new("!");
        assert_eq!(parser.parse("console", "   ", None).content, Content::Empty);
    }

    #[test]
    fn test_parse_bare_prefix() {
        let parser = MessageParser::new("!");
        assert_eq!(parser.parse("console", "/", None).content, Content::Empty);
        assert_eq!(parser.parse("console", "!", None).content, Content::Empty);
        assert_eq!(parser.parse("console", "  /  ", None).content, Content::Empty);
    }
}
