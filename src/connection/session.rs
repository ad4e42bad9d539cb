//! Sessions
//!
//! An `Auto` session removes a frame from its queue the moment it is
//! received. A `Transacted` session keeps every received frame and every sent
//! frame on the side until `commit`:
//! - `commit` publishes the buffered sends and forgets the received frames
//! - `rollback` drops the buffered sends and hands every received frame back
//!   to the broker with its redelivery count bumped, or dead-letters it once
//!   the factory's `RedeliveryPolicy` is exhausted

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use crate::broker::Frame;
use crate::connection::pool::FactoryState;
use crate::utils::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcknowledgeMode {
    Auto,
    Transacted,
}

#[derive(Debug)]
pub struct Session {
    state: Arc<FactoryState>,
    _permit: Arc<OwnedSemaphorePermit>,
    mode: AcknowledgeMode,
    delivered: Vec<Frame>,
    pending_sends: Vec<Frame>,
}

impl Session {
    pub(crate) fn new(
        state: Arc<FactoryState>,
        permit: Arc<OwnedSemaphorePermit>,
        mode: AcknowledgeMode,
    ) -> Self {
        Self {
            state,
            _permit: permit,
            mode,
            delivered: Vec::new(),
            pending_sends: Vec::new(),
        }
    }

    pub fn mode(&self) -> AcknowledgeMode {
        self.mode
    }

    /// True while received or sent frames are waiting for commit or rollback.
    pub fn in_transaction(&self) -> bool {
        !self.delivered.is_empty() || !self.pending_sends.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.is_running() {
            Ok(())
        } else {
            Err(Error::ConnectionFactoryStopped)
        }
    }

    /// Send a frame. Returns its message id.
    pub async fn send(&mut self, frame: Frame) -> Result<String> {
        self.ensure_open()?;
        let message_id = frame.message_id.clone();
        match self.mode {
            AcknowledgeMode::Auto => self.state.broker.send(&frame).await?,
            AcknowledgeMode::Transacted => self.pending_sends.push(frame),
        }
        Ok(message_id)
    }

    /// Receive the next frame of `queue`, waiting up to `timeout`.
    pub async fn receive(&mut self, queue: &str, timeout: Duration) -> Result<Option<Frame>> {
        self.ensure_open()?;
        let queue = self.state.broker.queue(queue).await?;
        let Some(bytes) = queue.pop(timeout).await else {
            return Ok(None);
        };
        let frame = Frame::decode(&bytes)?;
        if self.mode == AcknowledgeMode::Transacted {
            self.delivered.push(frame.clone());
        }
        Ok(Some(frame))
    }

    pub async fn commit(&mut self) -> Result<()> {
        if self.mode == AcknowledgeMode::Auto {
            return Ok(());
        }
        for frame in self.pending_sends.drain(..) {
            self.state.broker.send(&frame).await?;
        }
        for frame in self.delivered.drain(..) {
            debug!(message_id = %frame.message_id, "Delivery committed");
        }
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        if self.mode == AcknowledgeMode::Auto {
            return Ok(());
        }
        self.pending_sends.clear();
        if self.delivered.is_empty() {
            return Ok(());
        }

        let policy = self.state.redelivery_policy.clone();
        if !policy.redelivery_delay.is_zero() {
            tokio::time::sleep(policy.redelivery_delay).await;
        }

        // Walk backwards so pushing to the head keeps the original order.
        let delivered: Vec<Frame> = self.delivered.drain(..).rev().collect();
        for mut frame in delivered {
            frame.redelivery_count += 1;
            if policy.allows(frame.redelivery_count) {
                self.state.broker.redeliver(&frame).await?;
            } else {
                self.state.broker.dead_letter(&frame).await?;
            }
        }
        Ok(())
    }

    /// Create a queue that only lives until `delete_temporary_queue`.
    pub async fn create_temporary_queue(&self) -> Result<String> {
        self.ensure_open()?;
        self.state.broker.create_temporary_queue().await
    }

    pub async fn delete_temporary_queue(&self, name: &str) {
        self.state.broker.delete_queue(name).await;
    }

    /// Close the session, rolling back anything left uncommitted.
    pub async fn close(mut self) -> Result<()> {
        if self.in_transaction() {
            warn!(
                delivered = self.delivered.len(),
                "Closing session with an open transaction, rolling back"
            );
            if self.state.broker.is_running() {
                self.rollback().await?;
            }
        }
        Ok(())
    }
}
