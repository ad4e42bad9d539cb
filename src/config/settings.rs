use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

use crate::connection::{PoolSettings, RedeliveryPolicy};
use crate::integration::PollerMetadata;

/// Top-level configuration settings for the application.
///
/// The defaults reproduce the fixed wiring: a 10 s producer, `test.queue`,
/// a 1 s / 10 message polling listener and a consumer failing every third call.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub log_level: String,
    pub broker: BrokerSettings,
    pub producer: ProducerSettings,
    pub listener: ListenerSettings,
    pub consumer: ConsumerSettings,
}

/// Embedded broker and connection pool.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub name: String,
    pub max_connections: usize,
    pub max_sessions_per_connection: usize,
    pub acquire_timeout_ms: u64,
}

/// Clock source pump.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProducerSettings {
    pub fixed_rate_ms: u64,
    pub max_messages_per_poll: usize,
}

/// Queue listener, both delivery modes.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ListenerSettings {
    pub queue: String,
    pub fixed_delay_ms: u64,
    pub max_messages_per_poll: usize,
    pub receive_timeout_ms: u64,
    pub max_redeliveries: Option<u32>,
    pub redelivery_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConsumerSettings {
    pub failure_interval: u64,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub log_level: Option<String>,
    pub broker: Option<PartialBrokerSettings>,
    pub producer: Option<PartialProducerSettings>,
    pub listener: Option<PartialListenerSettings>,
    pub consumer: Option<PartialConsumerSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub name: Option<String>,
    pub max_connections: Option<usize>,
    pub max_sessions_per_connection: Option<usize>,
    pub acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialProducerSettings {
    pub fixed_rate_ms: Option<u64>,
    pub max_messages_per_poll: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialListenerSettings {
    pub queue: Option<String>,
    pub fixed_delay_ms: Option<u64>,
    pub max_messages_per_poll: Option<usize>,
    pub receive_timeout_ms: Option<u64>,
    pub max_redeliveries: Option<u32>,
    pub redelivery_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialConsumerSettings {
    pub failure_interval: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            broker: BrokerSettings {
                name: "localhost".to_string(),
                max_connections: 8,
                max_sessions_per_connection: 500,
                acquire_timeout_ms: 30_000,
            },
            producer: ProducerSettings {
                fixed_rate_ms: 10_000,
                max_messages_per_poll: 1,
            },
            listener: ListenerSettings {
                queue: "test.queue".to_string(),
                fixed_delay_ms: 1_000,
                max_messages_per_poll: 10,
                receive_timeout_ms: 1_000,
                max_redeliveries: None,
                redelivery_delay_ms: 0,
            },
            consumer: ConsumerSettings {
                failure_interval: 3,
            },
        }
    }
}

impl Settings {
    /// Rejects values the runtime cannot honour: zero periods and an empty pool.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("broker.max_connections", self.broker.max_connections as u64),
            (
                "broker.max_sessions_per_connection",
                self.broker.max_sessions_per_connection as u64,
            ),
            ("producer.fixed_rate_ms", self.producer.fixed_rate_ms),
            ("listener.fixed_delay_ms", self.listener.fixed_delay_ms),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Message(format!("{key} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.broker.max_connections,
            max_sessions_per_connection: self.broker.max_sessions_per_connection,
            acquire_timeout: Duration::from_millis(self.broker.acquire_timeout_ms),
        }
    }

    pub fn redelivery_policy(&self) -> RedeliveryPolicy {
        RedeliveryPolicy {
            max_redeliveries: self.listener.max_redeliveries,
            redelivery_delay: Duration::from_millis(self.listener.redelivery_delay_ms),
        }
    }

    pub fn producer_poller(&self) -> PollerMetadata {
        PollerMetadata::fixed_rate(
            Duration::from_millis(self.producer.fixed_rate_ms),
            self.producer.max_messages_per_poll,
        )
    }

    pub fn listener_poller(&self) -> PollerMetadata {
        PollerMetadata::fixed_delay(
            Duration::from_millis(self.listener.fixed_delay_ms),
            self.listener.max_messages_per_poll,
        )
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.listener.receive_timeout_ms)
    }
}
