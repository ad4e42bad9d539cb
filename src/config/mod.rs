//! Runtime configuration.
//!
//! The defaults in [`Settings::default`] are the fixed wiring of the
//! pipeline. An optional `config/default.*` file and `POPQUEUE__*`
//! environment variables are an extension on top of it: they only override
//! individual values, and with none set the application behaves exactly as
//! wired.

mod settings;

use config::{Config, ConfigError, Environment, File};

use crate::config::settings::PartialSettings;

pub use settings::{
    BrokerSettings, ConsumerSettings, ListenerSettings, ProducerSettings, Settings,
};

/// Prefix of environment overrides, e.g. `POPQUEUE__LISTENER__MAX_REDELIVERIES=5`.
pub const ENV_PREFIX: &str = "POPQUEUE";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit, optional, config file.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = merge(partial, Settings::default());
    settings.validate()?;
    Ok(settings)
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let broker = partial.broker.unwrap_or_default();
    let producer = partial.producer.unwrap_or_default();
    let listener = partial.listener.unwrap_or_default();
    let consumer = partial.consumer.unwrap_or_default();

    Settings {
        log_level: partial.log_level.unwrap_or(default.log_level),
        broker: BrokerSettings {
            name: broker.name.unwrap_or(default.broker.name),
            max_connections: broker
                .max_connections
                .unwrap_or(default.broker.max_connections),
            max_sessions_per_connection: broker
                .max_sessions_per_connection
                .unwrap_or(default.broker.max_sessions_per_connection),
            acquire_timeout_ms: broker
                .acquire_timeout_ms
                .unwrap_or(default.broker.acquire_timeout_ms),
        },
        producer: ProducerSettings {
            fixed_rate_ms: producer
                .fixed_rate_ms
                .unwrap_or(default.producer.fixed_rate_ms),
            max_messages_per_poll: producer
                .max_messages_per_poll
                .unwrap_or(default.producer.max_messages_per_poll),
        },
        listener: ListenerSettings {
            queue: listener.queue.unwrap_or(default.listener.queue),
            fixed_delay_ms: listener
                .fixed_delay_ms
                .unwrap_or(default.listener.fixed_delay_ms),
            max_messages_per_poll: listener
                .max_messages_per_poll
                .unwrap_or(default.listener.max_messages_per_poll),
            receive_timeout_ms: listener
                .receive_timeout_ms
                .unwrap_or(default.listener.receive_timeout_ms),
            max_redeliveries: listener
                .max_redeliveries
                .or(default.listener.max_redeliveries),
            redelivery_delay_ms: listener
                .redelivery_delay_ms
                .unwrap_or(default.listener.redelivery_delay_ms),
        },
        consumer: ConsumerSettings {
            failure_interval: consumer
                .failure_interval
                .unwrap_or(default.consumer.failure_interval),
        },
    }
}
