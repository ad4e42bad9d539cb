//! Embedded, in-process message broker.
//!
//! The broker keeps named FIFO queues in memory only: everything is lost when
//! the process exits. Queues are created the first time they are used, frames
//! are stored serialized, and a dedicated dead-letter queue receives messages
//! that exhausted their redelivery budget.

pub mod engine;
pub mod message;
pub mod queue;

pub use engine::Broker;
pub use message::Frame;
pub use queue::Queue;
