//! The `consumer` module holds the business end of the listener path.
//!
//! A [`MessageConsumer`] gets every delivered message and decides whether
//! processing succeeded. Two implementations exist:
//!
//! - [`LoggingConsumer`]: logs the payload at info level, never fails
//! - [`FailingLoggingConsumer`]: prints `<now>: <payload>` to stdout but fails
//!   every n-th invocation (third by default), to exercise rollback and
//!   redelivery
//!
//! [`ConsumerHandler`] plugs a consumer into a `DirectChannel`.

pub mod counter;
pub mod logging;

use std::sync::Arc;

use async_trait::async_trait;

use crate::integration::{Message, MessageHandler};
use crate::utils::Result;

pub use counter::DeliveryCounter;
pub use logging::{FailingLoggingConsumer, LoggingConsumer};

pub trait MessageConsumer: Send + Sync {
    fn consume(&self, message: &Message) -> Result<()>;
}

/// Adapts a `MessageConsumer` to a channel subscriber.
#[derive(Clone)]
pub struct ConsumerHandler {
    consumer: Arc<dyn MessageConsumer>,
}

impl ConsumerHandler {
    pub fn new(consumer: Arc<dyn MessageConsumer>) -> Self {
        Self { consumer }
    }
}

#[async_trait]
impl MessageHandler for ConsumerHandler {
    async fn handle(&self, message: Message) -> Result<()> {
        self.consumer.consume(&message)
    }
}
