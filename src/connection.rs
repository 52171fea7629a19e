//! The execution contract every backend satisfies.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::SqlFxError;
use crate::results::ResultSet;
use crate::types::Primitive;

/// One live database session.
///
/// Callers never run two statements on the same connection at once; shared
/// use goes through [`SharedConnection`].
#[async_trait]
pub trait Connection: Send {
    /// Run one compiled statement and collect its rows.
    async fn execute_raw(
        &mut self,
        sql: &str,
        params: &[Primitive],
    ) -> Result<ResultSet, SqlFxError>;

    /// Run a parameterless multi-statement script.
    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlFxError>;

    /// Flag the session as unusable so its pool discards it on release.
    fn mark_broken(&mut self) {}
}

pub type BoxedConnection = Box<dyn Connection>;

/// Source of connections; dropping the returned box releases it.
#[async_trait]
pub trait Acquire: Send + Sync {
    async fn acquire(&self) -> Result<BoxedConnection, SqlFxError>;
}

/// A connection shared by every statement of one transaction scope.
///
/// Statements lock the connection for the duration of their round trip, so
/// concurrent children of a transaction queue up instead of interleaving.
#[derive(Clone)]
pub struct SharedConnection {
    inner: Arc<Mutex<BoxedConnection>>,
}

impl std::fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConnection").finish_non_exhaustive()
    }
}

impl SharedConnection {
    #[must_use]
    pub fn new(conn: BoxedConnection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    /// # Errors
    /// Propagates the driver error of the statement.
    pub async fn execute_raw(
        &self,
        sql: &str,
        params: &[Primitive],
    ) -> Result<ResultSet, SqlFxError> {
        let mut conn = self.inner.lock().await;
        conn.execute_raw(sql, params).await
    }

    /// # Errors
    /// Propagates the driver error of the script.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), SqlFxError> {
        let mut conn = self.inner.lock().await;
        conn.execute_batch(sql).await
    }

    pub async fn mark_broken(&self) {
        self.inner.lock().await.mark_broken();
    }
}
