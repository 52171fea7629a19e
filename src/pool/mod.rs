//! Pooled connections on top of `bb8`.
//!
//! Backends implement [`Driver`]/[`DriverConnection`]; [`Pool`] turns them
//! into an [`Acquire`] implementation with TTL-bounded connections.

mod config;
mod manager;

pub use config::PoolConfig;
pub use manager::{DriverManager, Managed};

use std::future::Future;

use async_trait::async_trait;

use crate::connection::{Acquire, BoxedConnection, Connection};
use crate::error::SqlFxError;
use crate::results::ResultSet;
use crate::types::Primitive;

/// Opens new sessions for one database.
pub trait Driver: Send + Sync + 'static {
    type Conn: DriverConnection;

    fn connect(&self) -> impl Future<Output = Result<Self::Conn, SqlFxError>> + Send;
}

/// A raw backend session, before pooling.
#[async_trait]
pub trait DriverConnection: Send + 'static {
    async fn execute(&mut self, sql: &str, params: &[Primitive])
    -> Result<ResultSet, SqlFxError>;

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlFxError>;

    /// Health check run by the pool before handing a connection out.
    async fn ping(&mut self) -> Result<(), SqlFxError> {
        self.execute_batch("SELECT 1").await
    }

    /// True once the transport is known to be gone.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    pub connections: u32,
    pub idle_connections: u32,
}

/// A bounded pool of driver connections.
pub struct Pool<D: Driver> {
    inner: bb8::Pool<DriverManager<D>>,
    config: PoolConfig,
}

impl<D: Driver> Clone for Pool<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: self.config.clone(),
        }
    }
}

impl<D: Driver> std::fmt::Debug for Pool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl<D: Driver> Pool<D> {
    /// Build the pool and open `min_size` connections.
    ///
    /// # Errors
    /// Returns `SqlFxError::ConfigError` for inconsistent sizes and the
    /// driver's error if the initial connections cannot be opened.
    pub async fn new(driver: D, config: PoolConfig) -> Result<Self, SqlFxError> {
        config.validate()?;
        let inner = bb8::Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_size))
            .max_lifetime(Some(config.idle_ttl))
            .connection_timeout(config.acquire_timeout)
            .build(DriverManager::new(driver))
            .await?;
        Ok(Self { inner, config })
    }

    /// Check out a connection, waiting while the pool is at capacity.
    ///
    /// # Errors
    /// Returns the driver's connect error, or `SqlFxError::Sql` on timeout.
    pub async fn get(&self) -> Result<PooledConnection<D>, SqlFxError> {
        let conn = self.inner.get_owned().await?;
        Ok(PooledConnection { conn })
    }

    #[must_use]
    pub fn state(&self) -> PoolState {
        let state = self.inner.state();
        PoolState {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

#[async_trait]
impl<D: Driver> Acquire for Pool<D> {
    async fn acquire(&self) -> Result<BoxedConnection, SqlFxError> {
        let conn = self.get().await?;
        Ok(Box::new(conn))
    }
}

/// A checked-out connection; returns to the pool on drop.
pub struct PooledConnection<D: Driver> {
    conn: bb8::PooledConnection<'static, DriverManager<D>>,
}

#[async_trait]
impl<D: Driver> Connection for PooledConnection<D> {
    async fn execute_raw(
        &mut self,
        sql: &str,
        params: &[Primitive],
    ) -> Result<ResultSet, SqlFxError> {
        let managed = &mut *self.conn;
        // Stays set if this future is dropped mid-statement, which makes the
        // pool discard the connection instead of reusing it.
        managed.in_flight = true;
        let result = managed.conn.execute(sql, params).await;
        managed.in_flight = false;
        result
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlFxError> {
        let managed = &mut *self.conn;
        managed.in_flight = true;
        let result = managed.conn.execute_batch(sql).await;
        managed.in_flight = false;
        result
    }

    fn mark_broken(&mut self) {
        self.conn.broken = true;
    }
}
