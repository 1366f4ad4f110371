//! Event bus - forwards chat messages to loaded modules

use std::panic::{self, AssertUnwindSafe};
use std::sync::{PoisonError, RwLock, Weak};

use crate::application::modules::{Module, ModuleBus};
use crate::domain::entities::Message;

/// In-process [`ModuleBus`] holding weak subscribers in registration order.
///
/// Deliveries run on a snapshot taken under the subscriber lock and released
/// before any module code runs, so modules may unregister, or trigger an unload,
/// from `on_message`. A delivery already in flight may still reach a module
/// after it was unregistered.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<(String, Weak<dyn Module>)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward `message` to every live subscriber and collect their replies
    pub fn dispatch(&self, message: &Message) -> Vec<String> {
        let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner).clone();

        let mut replies = Vec::new();
        for (id, subscriber) in &subscribers {
            let Some(module) = subscriber.upgrade() else {
                continue;
            };

            match panic::catch_unwind(AssertUnwindSafe(|| module.on_message(message))) {
                Ok(Some(reply)) => replies.push(reply),
                Ok(None) => {}
                Err(_) => tracing::error!(module = id.as_str(), "Module panicked while handling message {}", message.id),
            }
        }
        replies
    }

    /// Ids of current subscribers, in registration order
    pub fn subscribers(&self) -> Vec<String> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl ModuleBus for EventBus {
    fn register(&self, id: &str, module: Weak<dyn Module>) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|(existing, _)| existing != id);
        subscribers.push((id.to_string(), module));
        tracing::debug!("Subscribed module {} to the event bus", id);
    }

    fn unregister(&self, id: &str) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| existing != id);
        tracing::debug!("Unsubscribed module {} from the event bus", id);
    }
}
