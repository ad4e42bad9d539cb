//! Polling adapters
//!
//! A `SourcePollingChannelAdapter` asks its `MessageSource` for messages on a
//! trigger and pushes each one into a `DirectChannel`. It backs both the
//! producer pump (clock source, fixed rate, one message per poll) and the
//! polling queue listener (queue source, fixed delay, up to ten per poll).
//!
//! - a poll stops early as soon as the source has nothing
//! - a failed send is logged and dropped; it never stops the timer
//! - cancellation is checked between messages and between polls

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::integration::channel::DirectChannel;
use crate::integration::source::MessageSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Start a poll every period, measured from the start of the previous one.
    FixedRate(Duration),
    /// Wait this long after a poll finishes before starting the next.
    FixedDelay(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerMetadata {
    pub trigger: Trigger,
    pub max_messages_per_poll: usize,
}

impl PollerMetadata {
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);
    /// Shortest period a trigger runs at; zero is raised to this.
    pub const MIN_PERIOD: Duration = Duration::from_millis(1);

    pub fn fixed_rate(period: Duration, max_messages_per_poll: usize) -> Self {
        Self {
            trigger: Trigger::FixedRate(period),
            max_messages_per_poll,
        }
    }

    pub fn fixed_delay(delay: Duration, max_messages_per_poll: usize) -> Self {
        Self {
            trigger: Trigger::FixedDelay(delay),
            max_messages_per_poll,
        }
    }
}

/// Poller used by adapters that are not given one explicitly.
impl Default for PollerMetadata {
    fn default() -> Self {
        Self::fixed_rate(Self::DEFAULT_PERIOD, 1)
    }
}

pub struct SourcePollingChannelAdapter<S> {
    name: String,
    source: S,
    output: Arc<DirectChannel>,
    poller: PollerMetadata,
}

impl<S> SourcePollingChannelAdapter<S>
where
    S: MessageSource + 'static,
{
    pub fn new(name: &str, source: S, output: Arc<DirectChannel>) -> Self {
        Self {
            name: name.to_string(),
            source,
            output,
            poller: PollerMetadata::default(),
        }
    }

    pub fn with_poller(mut self, poller: PollerMetadata) -> Self {
        self.poller = poller;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn poller(&self) -> &PollerMetadata {
        &self.poller
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run a single poll. Returns how many messages were taken from the source.
    pub async fn poll_once(&self) -> usize {
        self.poll(&CancellationToken::new()).await
    }

    async fn poll(&self, cancel: &CancellationToken) -> usize {
        let mut received = 0;
        while received < self.poller.max_messages_per_poll && !cancel.is_cancelled() {
            let message = match self.source.receive().await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(e) => {
                    error!(adapter = %self.name, "Source failed: {e}");
                    break;
                }
            };
            received += 1;

            let payload = message.payload.clone();
            match self.output.send(message).await {
                Ok(()) => debug!(adapter = %self.name, %payload, "Message dispatched"),
                Err(e) if e.is_handler_failure() => {
                    warn!(adapter = %self.name, %payload, "Handler failed, message dropped: {e}")
                }
                Err(e) => {
                    error!(adapter = %self.name, %payload, "Dispatch failed, message lost: {e}")
                }
            }
        }
        received
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            adapter = %self.name,
            channel = self.output.name(),
            trigger = ?self.poller.trigger,
            max_messages_per_poll = self.poller.max_messages_per_poll,
            "Polling adapter started"
        );

        match self.poller.trigger {
            Trigger::FixedRate(period) => {
                let mut ticker = interval(period.max(PollerMetadata::MIN_PERIOD));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            self.poll(&cancel).await;
                        }
                    }
                }
            }
            Trigger::FixedDelay(delay) => loop {
                self.poll(&cancel).await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay.max(PollerMetadata::MIN_PERIOD)) => {}
                }
            },
        }

        info!(adapter = %self.name, "Polling adapter stopped");
    }
}
