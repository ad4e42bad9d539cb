//! The `integration` module provides the building blocks the pipelines are
//! wired from:
//!
//! - `message`: the in-process `Message` and its headers
//! - `channel`: `DirectChannel`, a single-subscriber synchronous handoff
//! - `handler`: the `MessageHandler` capability channel subscribers implement
//! - `source`: pollable `MessageSource`s (wall clock, queue)
//! - `poller`: triggers and the `SourcePollingChannelAdapter` driving a source
//! - `gateway`: `QueueOutboundGateway`, publishing channel messages to a queue
//! - `listener`: the transacted `MessageDrivenChannelAdapter` and `QueueListener`

pub mod channel;
pub mod gateway;
pub mod handler;
pub mod listener;
pub mod message;
pub mod poller;
pub mod source;

pub use channel::DirectChannel;
pub use gateway::{QueueOutboundGateway, ReplySettings};
pub use handler::MessageHandler;
pub use listener::{DeliveryEvent, DeliveryState, MessageDrivenChannelAdapter, QueueListener};
pub use message::{Message, MessageHeaders};
pub use poller::{PollerMetadata, SourcePollingChannelAdapter, Trigger};
pub use source::{Clock, ClockSource, MessageSource, QueueMessageSource, SystemClock};

#[cfg(test)]
mod tests;
