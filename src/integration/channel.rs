//! Direct channel
//!
//! `DirectChannel` has exactly one subscriber slot. `send` runs the
//! subscriber on the caller's task and returns its result, so there is no
//! buffering between producer and handler.

use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::integration::handler::MessageHandler;
use crate::integration::message::Message;
use crate::utils::{Error, Result};

pub struct DirectChannel {
    name: String,
    subscriber: OnceLock<Arc<dyn MessageHandler>>,
}

impl DirectChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscriber: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach the handler. Returns `false` if the slot is already taken.
    pub fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> bool {
        let accepted = self.subscriber.set(handler).is_ok();
        if !accepted {
            warn!(channel = %self.name, "Channel already has a subscriber");
        }
        accepted
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber.get().is_some()
    }

    /// Hand the message to the subscriber and wait for it to finish.
    pub async fn send(&self, message: Message) -> Result<()> {
        let handler = self.subscriber.get().ok_or_else(|| Error::NoSubscriber {
            channel: self.name.clone(),
        })?;
        handler.handle(message).await
    }
}

impl std::fmt::Debug for DirectChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectChannel")
            .field("name", &self.name)
            .field("subscribed", &self.has_subscriber())
            .finish()
    }
}
