use chrono::Utc;
use uuid::Uuid;

use crate::broker::Frame;

/// Headers every in-process message carries.
///
/// `broker_message_id`, `redelivered` and `correlation_id` are only filled in
/// for messages that came out of a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeaders {
    pub id: Uuid,
    pub timestamp: i64,
    pub broker_message_id: Option<String>,
    pub redelivered: bool,
    pub correlation_id: Option<String>,
}

/// An immutable payload travelling through channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub payload: String,
    pub headers: MessageHeaders,
}

impl Message {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            headers: MessageHeaders {
                id: Uuid::new_v4(),
                timestamp: Utc::now().timestamp_millis(),
                broker_message_id: None,
                redelivered: false,
                correlation_id: None,
            },
        }
    }

    pub fn from_frame(frame: &Frame) -> Self {
        let mut message = Self::new(frame.payload.clone());
        message.headers.broker_message_id = Some(frame.message_id.clone());
        message.headers.redelivered = frame.redelivered();
        message.headers.correlation_id = frame.correlation_id.clone();
        message
    }
}
