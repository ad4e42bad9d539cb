//! Pollable message sources
//!
//! A `MessageSource` is asked for at most one message per call and may have
//! nothing to give. Pollers decide how often and how many times to ask.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::connection::{AcknowledgeMode, ConnectionFactory};
use crate::integration::message::Message;
use crate::utils::Result;

#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn receive(&self) -> Result<Option<Message>>;
}

/// Wall-clock reading, local time without zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

impl<F> Clock for F
where
    F: Fn() -> NaiveDateTime + Send + Sync,
{
    fn now(&self) -> NaiveDateTime {
        self()
    }
}

/// ISO-8601 local date-time, e.g. `2024-01-01T00:00:00` or
/// `2024-01-01T10:15:30.123`. The fraction is left out when it is zero.
pub fn iso_date_time(time: &NaiveDateTime) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// Produces one message per call whose payload is the current time.
#[derive(Clone)]
pub struct ClockSource {
    clock: Arc<dyn Clock>,
}

impl ClockSource {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for ClockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSource for ClockSource {
    async fn receive(&self) -> Result<Option<Message>> {
        Ok(Some(Message::new(iso_date_time(&self.clock.now()))))
    }
}

/// Pulls from a queue with an auto-acknowledged session. Whatever it returns
/// is already gone from the queue.
#[derive(Debug, Clone)]
pub struct QueueMessageSource {
    connection_factory: ConnectionFactory,
    destination: String,
    receive_timeout: Duration,
}

impl QueueMessageSource {
    pub fn new(
        connection_factory: ConnectionFactory,
        destination: &str,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            connection_factory,
            destination: destination.to_string(),
            receive_timeout,
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

#[async_trait]
impl MessageSource for QueueMessageSource {
    async fn receive(&self) -> Result<Option<Message>> {
        let connection = self.connection_factory.create_connection().await?;
        let mut session = connection.create_session(AcknowledgeMode::Auto);
        let frame = session
            .receive(&self.destination, self.receive_timeout)
            .await?;
        Ok(frame.as_ref().map(Message::from_frame))
    }
}
