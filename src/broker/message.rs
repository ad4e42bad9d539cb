//! Broker frame definition
//!
//! `Frame` is what actually travels through a queue. It is serialized to JSON
//! when enqueued and decoded again on receive, so the broker never shares
//! memory with producers or consumers.
//!
//! Notes on fields:
//! - `message_id`: unique id assigned by the sending session
//! - `destination`: name of the queue the frame was sent to
//! - `payload`: the message body
//! - `timestamp`: milliseconds since UNIX epoch, set when the frame is built
//! - `redelivery_count`: number of times the frame was rolled back
//! - `reply_to` / `correlation_id`: only set for request/reply exchanges

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub message_id: String,
    pub destination: String,
    pub payload: String,
    pub timestamp: i64,
    #[serde(default)]
    pub redelivery_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Frame {
    /// Build a fresh frame for `destination` with a new id and the current time.
    pub fn new(destination: &str, payload: &str) -> Self {
        Self {
            message_id: format!("ID:{}", Uuid::new_v4()),
            destination: destination.to_string(),
            payload: payload.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            redelivery_count: 0,
            reply_to: None,
            correlation_id: None,
        }
    }

    pub fn with_reply_to(mut self, reply_to: &str, correlation_id: &str) -> Self {
        self.reply_to = Some(reply_to.to_string());
        self.correlation_id = Some(correlation_id.to_string());
        self
    }

    pub fn redelivered(&self) -> bool {
        self.redelivery_count > 0
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
