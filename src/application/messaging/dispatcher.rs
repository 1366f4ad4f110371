//! Message dispatcher - Routes messages to built-in commands or loaded modules

use std::sync::Arc;

use crate::application::services::ModuleAdminService;
use crate::domain::entities::{Content, Message};
use super::bus::EventBus;
use super::parser::MessageParser;

/// Routes parsed messages: built-in commands are answered here, everything
/// else is forwarded to modules through the event bus
pub struct MessageDispatcher {
    parser: MessageParser,
    admin: ModuleAdminService,
    bus: Arc<EventBus>,
}

impl MessageDispatcher {
    pub fn new(prefix: impl Into<String>, admin: ModuleAdminService, bus: Arc<EventBus>) -> Self {
        Self {
            parser: MessageParser::new(prefix),
            admin,
            bus,
        }
    }

    /// Process a raw text line
    pub fn process_text(&self, chat_id: impl Into<String>, text: impl Into<String>) -> Vec<String> {
        let message = self.parser.parse(chat_id, text, None);
        self.process(&message)
    }

    /// Process a message, returning every reply
    pub fn process(&self, message: &Message) -> Vec<String> {
        match &message.content {
            Content::Empty => Vec::new(),
            Content::Command { name, args } => match name.as_str() {
                "module" => vec![self.admin.handle(args)],
                "help" => vec![self.help()],
                "version" => vec![format!("carik-host v{}", env!("CARGO_PKG_VERSION"))],
                _ => self.forward(message),
            },
            Content::Text(_) => self.forward(message),
        }
    }

    fn forward(&self, message: &Message) -> Vec<String> {
        let replies = self.bus.dispatch(message);
        if replies.is_empty() {
            tracing::debug!("No module answered message {}", message.id);
        }
        replies
    }

    fn help(&self) -> String {
        let prefix = self.parser.prefix();
        format!(
            "Available commands:\n  /help - Show this message\n  /version - Show host version\n  /module - Manage modules\n\
             Commands may also start with '{}'. Anything else is forwarded to loaded modules.",
            prefix
        )
    }
}
