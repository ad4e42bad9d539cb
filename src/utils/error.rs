//! Crate-wide error type.
//!
//! Errors are terminal to the single message or poll cycle they occur in. The
//! only error that travels further is a handler failure inside a transacted
//! delivery, which the listener turns into a session rollback.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection factory is not running")]
    ConnectionFactoryStopped,

    #[error("no free connection in the pool after {0:?}")]
    PoolExhausted(Duration),

    #[error("broker '{0}' is stopped")]
    BrokerStopped(String),

    #[error("failed to encode or decode a broker frame")]
    Codec(#[from] serde_json::Error),

    #[error("failed to publish to '{destination}'")]
    Publish {
        destination: String,
        #[source]
        source: Box<Error>,
    },

    #[error("no reply received from '{destination}' within {timeout:?}")]
    ReplyTimeout {
        destination: String,
        timeout: Duration,
    },

    #[error("channel '{channel}' has no subscriber")]
    NoSubscriber { channel: String },

    #[error("{reason}: {payload}")]
    Handler { reason: String, payload: String },

    #[error("configuration error")]
    Config(#[from] config::ConfigError),

    #[error("failed to wait for the shutdown signal")]
    Signal(#[from] std::io::Error),
}

impl Error {
    pub fn publish(destination: &str, source: Error) -> Self {
        Self::Publish {
            destination: destination.to_string(),
            source: Box::new(source),
        }
    }

    /// True for errors raised by a consumer rather than by the plumbing.
    pub fn is_handler_failure(&self) -> bool {
        matches!(self, Self::Handler { .. })
    }
}
