//! Queue listeners
//!
//! Two delivery modes sit behind `QueueListener`:
//!
//! - `MessageDriven`: a transacted session receives one frame at a time and
//!   pushes it into the output channel. The transaction commits when the
//!   handler returns `Ok` and rolls back otherwise, which puts the frame back
//!   at the head of the queue for another attempt. The next frame is only
//!   received once the current transaction is resolved.
//! - `Polling`: a `SourcePollingChannelAdapter` over a `QueueMessageSource`.
//!   Frames are acknowledged on receipt, so a handler failure drops them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::Frame;
use crate::connection::{AcknowledgeMode, ConnectionFactory, PooledConnection, Session};
use crate::integration::channel::DirectChannel;
use crate::integration::message::Message;
use crate::integration::poller::SourcePollingChannelAdapter;
use crate::integration::source::QueueMessageSource;
use crate::utils::Error;

/// Where the transacted listener is with the frame it currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,
    Processing,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryEvent {
    Arrived,
    HandlerSucceeded,
    HandlerFailed,
}

impl DeliveryState {
    /// Next state, or `None` if `event` cannot happen in this state.
    pub fn on(self, event: DeliveryEvent) -> Option<DeliveryState> {
        use DeliveryEvent::*;
        use DeliveryState::*;

        match (self, event) {
            (Idle | Committed | RolledBack, Arrived) => Some(Processing),
            (Processing, HandlerSucceeded) => Some(Committed),
            (Processing, HandlerFailed) => Some(RolledBack),
            _ => None,
        }
    }
}

pub struct MessageDrivenChannelAdapter {
    connection_factory: ConnectionFactory,
    destination: String,
    output: Arc<DirectChannel>,
    receive_timeout: Duration,
    recovery_interval: Duration,
    state: watch::Sender<DeliveryState>,
}

impl MessageDrivenChannelAdapter {
    pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);
    pub const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new(
        connection_factory: ConnectionFactory,
        destination: &str,
        output: Arc<DirectChannel>,
    ) -> Self {
        let (state, _) = watch::channel(DeliveryState::Idle);
        Self {
            connection_factory,
            destination: destination.to_string(),
            output,
            receive_timeout: Self::DEFAULT_RECEIVE_TIMEOUT,
            recovery_interval: Self::DEFAULT_RECOVERY_INTERVAL,
            state,
        }
    }

    pub fn with_receive_timeout(mut self, receive_timeout: Duration) -> Self {
        self.receive_timeout = receive_timeout;
        self
    }

    pub fn with_recovery_interval(mut self, recovery_interval: Duration) -> Self {
        self.recovery_interval = recovery_interval;
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Watch the delivery state machine.
    pub fn subscribe_state(&self) -> watch::Receiver<DeliveryState> {
        self.state.subscribe()
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            queue = %self.destination,
            channel = self.output.name(),
            "Message-driven listener started"
        );

        let Some(connection) = self.connect(&cancel).await else {
            info!(queue = %self.destination, "Message-driven listener stopped");
            return;
        };
        let mut session = connection.create_session(AcknowledgeMode::Transacted);

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = session.receive(&self.destination, self.receive_timeout) => received,
            };
            match received {
                Ok(Some(frame)) => self.dispatch(&mut session, frame).await,
                Ok(None) => continue,
                Err(Error::ConnectionFactoryStopped | Error::BrokerStopped(_)) => break,
                Err(e) => error!(queue = %self.destination, "Receive failed: {e}"),
            }
        }

        if let Err(e) = session.close().await {
            error!(queue = %self.destination, "Failed to close session: {e}");
        }
        info!(queue = %self.destination, "Message-driven listener stopped");
    }

    async fn connect(&self, cancel: &CancellationToken) -> Option<PooledConnection> {
        loop {
            match self.connection_factory.create_connection().await {
                Ok(connection) => return Some(connection),
                Err(Error::ConnectionFactoryStopped) => return None,
                Err(e) => warn!(
                    queue = %self.destination,
                    retry_in = ?self.recovery_interval,
                    "Could not open connection: {e}"
                ),
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.recovery_interval) => {}
            }
        }
    }

    async fn dispatch(&self, session: &mut Session, frame: Frame) {
        self.transition(DeliveryEvent::Arrived);
        debug!(
            message_id = %frame.message_id,
            redelivery_count = frame.redelivery_count,
            "Delivering message"
        );

        match self.output.send(Message::from_frame(&frame)).await {
            Ok(()) => {
                if let Err(e) = session.commit().await {
                    error!(message_id = %frame.message_id, "Commit failed: {e}");
                }
                self.transition(DeliveryEvent::HandlerSucceeded);
            }
            Err(e) => {
                warn!(message_id = %frame.message_id, "Handler failed, rolling back: {e}");
                if let Err(e) = session.rollback().await {
                    error!(message_id = %frame.message_id, "Rollback failed: {e}");
                }
                self.transition(DeliveryEvent::HandlerFailed);
            }
        }
    }

    fn transition(&self, event: DeliveryEvent) {
        self.state.send_modify(|state| match state.on(event) {
            Some(next) => *state = next,
            None => warn!(?state, ?event, "Ignoring unexpected delivery event"),
        });
    }
}

/// A queue listener in one of its two delivery modes.
pub enum QueueListener {
    MessageDriven(MessageDrivenChannelAdapter),
    Polling(SourcePollingChannelAdapter<QueueMessageSource>),
}

impl QueueListener {
    pub fn destination(&self) -> &str {
        match self {
            Self::MessageDriven(adapter) => adapter.destination(),
            Self::Polling(adapter) => adapter.source().destination(),
        }
    }

    pub fn is_transacted(&self) -> bool {
        matches!(self, Self::MessageDriven(_))
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        match self {
            Self::MessageDriven(adapter) => adapter.spawn(cancel),
            Self::Polling(adapter) => adapter.spawn(cancel),
        }
    }
}
