//! The `connection` module is the client side of the embedded broker.
//!
//! A [`PooledConnectionFactory`] owns the lifecycle (start/stop) and bounds how
//! many connections may be open at once. Components never see the owner: they
//! get a cloneable [`ConnectionFactory`] handle, open a [`PooledConnection`],
//! and do their work through a [`Session`] that is either auto-acknowledged or
//! transacted.

pub mod pool;
pub mod redelivery;
pub mod session;

pub use pool::{ConnectionFactory, PoolSettings, PooledConnection, PooledConnectionFactory};
pub use redelivery::RedeliveryPolicy;
pub use session::{AcknowledgeMode, Session};
