//! # PopQueue
//!
//! `popqueue` wires a periodic timestamp producer to a queue on an embedded,
//! in-memory broker, and a queue consumer that either logs every message or
//! fails every third one to exercise transacted redelivery.
//!
//! ## Core Modules
//!
//! - `broker`: The embedded, non-persistent broker holding named FIFO queues.
//! - `connection`: Pooled connection factory, sessions and the redelivery policy.
//! - `integration`: Messages, channels, sources, pollers, the outbound gateway and the listeners.
//! - `consumer`: The `MessageConsumer` capability and its logging implementations.
//! - `config`: Handles loading and managing configuration.
//! - `application`: Composes and runs the two pipeline variants.
//! - `utils`: Contains shared utilities, such as error handling and logging.

pub mod application;
pub mod broker;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod integration;
pub mod utils;

pub use application::{Application, Variant};
