//! Broker engine
//!
//! This module contains the embedded broker responsible for:
//! - creating queues on first use and routing frames to them
//! - putting rolled back frames back at the head of their queue
//! - parking frames that exhausted their redelivery budget on the DLQ
//! - handing out temporary reply queues for request/reply exchanges
//!
//! Concurrency and usage notes:
//! - The broker is shared behind an `Arc` by every connection. All methods
//!   take `&self`; the queue map and each queue guard their own state.
//! - Nothing is persisted. Stopping the broker closes and drops every queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::message::Frame;
use crate::broker::queue::Queue;
use crate::utils::{Error, Result};

#[derive(Debug)]
pub struct Broker {
    name: String,
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    running: AtomicBool,
}

impl Broker {
    /// Queue receiving frames rolled back more often than the redelivery policy allows.
    pub const DEAD_LETTER_QUEUE: &'static str = "DLQ";

    const TEMP_QUEUE_PREFIX: &'static str = "temp-queue://";

    pub fn new(name: &str) -> Self {
        info!(broker = name, "Starting embedded broker (non-persistent)");
        Self {
            name: name.to_string(),
            queues: Mutex::new(HashMap::new()),
            running: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Look up a queue, creating it if this is the first time it is named.
    pub async fn queue(&self, name: &str) -> Result<Arc<Queue>> {
        if !self.is_running() {
            return Err(Error::BrokerStopped(self.name.clone()));
        }
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(name.to_string()).or_insert_with(|| {
            debug!(queue = name, "Creating queue");
            Arc::new(Queue::new(name))
        });
        Ok(queue.clone())
    }

    /// Enqueue a frame at the tail of its destination queue.
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode()?;
        self.queue(&frame.destination).await?.push_back(bytes).await;
        debug!(
            queue = %frame.destination,
            message_id = %frame.message_id,
            "Frame enqueued"
        );
        Ok(())
    }

    /// Return a rolled back frame to the head of its queue.
    pub async fn redeliver(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode()?;
        self.queue(&frame.destination).await?.push_front(bytes).await;
        debug!(
            queue = %frame.destination,
            message_id = %frame.message_id,
            redelivery_count = frame.redelivery_count,
            "Frame scheduled for redelivery"
        );
        Ok(())
    }

    /// Move a frame to the dead-letter queue. Its original destination is kept
    /// in the frame body so it can be inspected later.
    pub async fn dead_letter(&self, frame: &Frame) -> Result<()> {
        warn!(
            queue = %frame.destination,
            message_id = %frame.message_id,
            redelivery_count = frame.redelivery_count,
            "Redelivery budget exhausted, moving frame to {}",
            Self::DEAD_LETTER_QUEUE
        );
        let bytes = frame.encode()?;
        self.queue(Self::DEAD_LETTER_QUEUE)
            .await?
            .push_back(bytes)
            .await;
        Ok(())
    }

    /// Create a uniquely named queue for a single reply.
    pub async fn create_temporary_queue(&self) -> Result<String> {
        let name = format!("{}{}", Self::TEMP_QUEUE_PREFIX, Uuid::new_v4());
        self.queue(&name).await?;
        Ok(name)
    }

    pub async fn delete_queue(&self, name: &str) {
        if let Some(queue) = self.queues.lock().await.remove(name) {
            queue.close().await;
        }
    }

    /// Number of frames waiting in `name`; zero for unknown queues.
    pub async fn queue_depth(&self, name: &str) -> usize {
        let queue = self.queues.lock().await.get(name).cloned();
        match queue {
            Some(queue) => queue.len().await,
            None => 0,
        }
    }

    /// Stop accepting work, close every queue and wake parked receivers.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let queues: Vec<_> = self.queues.lock().await.drain().map(|(_, q)| q).collect();
        for queue in queues {
            queue.close().await;
        }
        info!(broker = %self.name, "Embedded broker stopped");
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new("localhost")
    }
}
