//! Pooled connection factory
//!
//! The pool keeps at most `max_connections` broker connections and lets
//! sessions multiplex over them. Each connection carries a semaphore of
//! `max_sessions_per_connection` permits; a lease picks the least loaded
//! connection and holds one permit for as long as it (or any session created
//! from it) lives. A long-lived listener therefore shares its connection with
//! publishers instead of starving them. Leasing blocks (up to
//! `acquire_timeout`) only when every session slot on every connection is taken.
//!
//! Lifecycle:
//! - `start` must be called before the first connection is created
//! - `stop` is terminal; it closes the semaphore so waiting and future
//!   `create_connection` calls fail with `ConnectionFactoryStopped`
//! - only the owning `PooledConnectionFactory` can stop the pool

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::connection::redelivery::RedeliveryPolicy;
use crate::connection::session::{AcknowledgeMode, Session};
use crate::utils::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: usize,
    pub max_sessions_per_connection: usize,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 8,
            max_sessions_per_connection: 500,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub(crate) struct FactoryState {
    pub(crate) broker: Arc<Broker>,
    pub(crate) redelivery_policy: RedeliveryPolicy,
    connections: Vec<Arc<Semaphore>>,
    settings: PoolSettings,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl FactoryState {
    pub(crate) fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    fn sessions_on(&self, connection: &Semaphore) -> usize {
        if connection.is_closed() {
            return 0;
        }
        self.settings.max_sessions_per_connection - connection.available_permits()
    }

    /// Most free session slots wins; ties go to the lowest index.
    fn least_loaded(&self) -> Option<&Arc<Semaphore>> {
        self.connections
            .iter()
            .rev()
            .max_by_key(|connection| connection.available_permits())
    }
}

/// Owner of the pool. Kept by the process, never handed to components.
#[derive(Debug)]
pub struct PooledConnectionFactory {
    state: Arc<FactoryState>,
}

impl PooledConnectionFactory {
    pub fn new(
        broker: Arc<Broker>,
        settings: PoolSettings,
        redelivery_policy: RedeliveryPolicy,
    ) -> Self {
        let connections = (0..settings.max_connections)
            .map(|_| Arc::new(Semaphore::new(settings.max_sessions_per_connection)))
            .collect();
        Self {
            state: Arc::new(FactoryState {
                broker,
                redelivery_policy,
                connections,
                settings,
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn start(&self) {
        if self.state.stopped.load(Ordering::SeqCst) {
            warn!("Ignoring start of a stopped connection factory");
            return;
        }
        if !self.state.started.swap(true, Ordering::SeqCst) {
            info!(
                broker = self.state.broker.name(),
                max_connections = self.state.settings.max_connections,
                max_sessions_per_connection = self.state.settings.max_sessions_per_connection,
                "Connection factory started"
            );
        }
    }

    pub fn stop(&self) {
        if self.state.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        for connection in &self.state.connections {
            connection.close();
        }
        info!(broker = self.state.broker.name(), "Connection factory stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// A handle components can use to open connections but not to stop the pool.
    pub fn handle(&self) -> ConnectionFactory {
        ConnectionFactory {
            state: self.state.clone(),
        }
    }
}

/// Shared, cloneable access to the pool.
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    state: Arc<FactoryState>,
}

impl ConnectionFactory {
    /// Lease a connection, waiting for a free session slot if the pool is saturated.
    pub async fn create_connection(&self) -> Result<PooledConnection> {
        if !self.state.is_running() {
            return Err(Error::ConnectionFactoryStopped);
        }
        let Some(connection) = self.state.least_loaded() else {
            return Err(Error::PoolExhausted(Duration::ZERO));
        };
        let timeout = self.state.settings.acquire_timeout;
        let permit = match tokio::time::timeout(timeout, connection.clone().acquire_owned())
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::ConnectionFactoryStopped),
            Err(_) => return Err(Error::PoolExhausted(timeout)),
        };
        debug!(
            connections = self.active_connections(),
            sessions = self.active_sessions(),
            "Connection leased"
        );
        Ok(PooledConnection {
            state: self.state.clone(),
            permit: Arc::new(permit),
        })
    }

    /// Connections with at least one live lease.
    pub fn active_connections(&self) -> usize {
        self.state
            .connections
            .iter()
            .filter(|connection| self.state.sessions_on(connection) > 0)
            .count()
    }

    pub fn active_sessions(&self) -> usize {
        self.state
            .connections
            .iter()
            .map(|connection| self.state.sessions_on(connection))
            .sum()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn redelivery_policy(&self) -> &RedeliveryPolicy {
        &self.state.redelivery_policy
    }
}

/// A lease on a shared pooled connection. The session slot is returned once
/// the lease and every session created from it are dropped.
#[derive(Debug)]
pub struct PooledConnection {
    state: Arc<FactoryState>,
    permit: Arc<OwnedSemaphorePermit>,
}

impl PooledConnection {
    pub fn create_session(&self, mode: AcknowledgeMode) -> Session {
        Session::new(self.state.clone(), self.permit.clone(), mode)
    }
}
