//! Outbound queue gateway
//!
//! Subscribed to the dispatch channel, the gateway turns every message into a
//! broker frame on a fixed destination. By default it is fire-and-forget. With
//! `ReplySettings` it waits on a temporary queue for a frame carrying the same
//! correlation id and forwards it to the reply channel, if one is set.
//!
//! Publish errors are returned as `Error::Publish` and not retried here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::Frame;
use crate::connection::{AcknowledgeMode, ConnectionFactory, Session};
use crate::integration::channel::DirectChannel;
use crate::integration::handler::MessageHandler;
use crate::integration::message::Message;
use crate::utils::{Error, Result};

#[derive(Debug, Clone)]
pub struct ReplySettings {
    pub timeout: Duration,
    pub channel: Option<Arc<DirectChannel>>,
}

#[derive(Debug, Clone)]
pub struct QueueOutboundGateway {
    connection_factory: ConnectionFactory,
    destination: String,
    reply: Option<ReplySettings>,
}

impl QueueOutboundGateway {
    pub fn new(connection_factory: ConnectionFactory, destination: &str) -> Self {
        Self {
            connection_factory,
            destination: destination.to_string(),
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: ReplySettings) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Publish `message` and, in request/reply mode, wait for the answer.
    pub async fn exchange(&self, message: &Message) -> Result<Option<Message>> {
        let connection = self
            .connection_factory
            .create_connection()
            .await
            .map_err(|e| Error::publish(&self.destination, e))?;
        let mut session = connection.create_session(AcknowledgeMode::Auto);

        let Some(reply) = &self.reply else {
            let frame = Frame::new(&self.destination, &message.payload);
            let message_id = session
                .send(frame)
                .await
                .map_err(|e| Error::publish(&self.destination, e))?;
            debug!(queue = %self.destination, %message_id, "Message published");
            return Ok(None);
        };

        let reply_queue = session
            .create_temporary_queue()
            .await
            .map_err(|e| Error::publish(&self.destination, e))?;
        let result = self
            .request(&mut session, message, &reply_queue, reply.timeout)
            .await;
        session.delete_temporary_queue(&reply_queue).await;
        result.map(Some)
    }

    async fn request(
        &self,
        session: &mut Session,
        message: &Message,
        reply_queue: &str,
        timeout: Duration,
    ) -> Result<Message> {
        let correlation_id = Uuid::new_v4().to_string();
        let frame = Frame::new(&self.destination, &message.payload)
            .with_reply_to(reply_queue, &correlation_id);
        session
            .send(frame)
            .await
            .map_err(|e| Error::publish(&self.destination, e))?;

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match session.receive(reply_queue, remaining).await? {
                Some(reply) if reply.correlation_id.as_deref() == Some(correlation_id.as_str()) => {
                    return Ok(Message::from_frame(&reply));
                }
                Some(stray) => {
                    warn!(message_id = %stray.message_id, "Discarding reply with foreign correlation id")
                }
                None => break,
            }
        }
        Err(Error::ReplyTimeout {
            destination: self.destination.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl MessageHandler for QueueOutboundGateway {
    async fn handle(&self, message: Message) -> Result<()> {
        let Some(reply) = self.exchange(&message).await? else {
            return Ok(());
        };
        match self.reply.as_ref().and_then(|r| r.channel.as_ref()) {
            Some(channel) => channel.send(reply).await,
            None => {
                debug!(payload = %reply.payload, "Reply received, no reply channel configured");
                Ok(())
            }
        }
    }
}
