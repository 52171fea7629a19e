//! In-memory connections for exercising clients without a database.
//!
//! [`RecordingAcquirer`] hands out connections that log every statement and
//! answer it through a caller-supplied handler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::client::Client;
use crate::connection::{Acquire, BoxedConnection, Connection};
use crate::error::SqlFxError;
use crate::results::ResultSet;
use crate::types::{Dialect, Primitive};

/// Produces the result for one statement.
pub type Handler = Arc<dyn Fn(&str, &[Primitive]) -> Result<ResultSet, SqlFxError> + Send + Sync>;

/// One logged statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Vec<Primitive>,
    /// Which checkout ran it; statements of one transaction share it.
    pub connection: usize,
}

#[derive(Clone)]
pub struct RecordingAcquirer {
    handler: Handler,
    log: Arc<Mutex<Vec<Executed>>>,
    acquired: Arc<AtomicUsize>,
}

impl std::fmt::Debug for RecordingAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingAcquirer")
            .field("acquired", &self.acquired_count())
            .finish_non_exhaustive()
    }
}

impl RecordingAcquirer {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[Primitive]) -> Result<ResultSet, SqlFxError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            log: Arc::new(Mutex::new(Vec::new())),
            acquired: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every statement succeeds with no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(|_, _| Ok(ResultSet::affected(0)))
    }

    /// A client of `dialect` backed by this acquirer.
    ///
    /// # Errors
    /// Never fails in practice; mirrors `ClientBuilder::build`.
    pub fn client(&self, dialect: Dialect) -> Result<Client, SqlFxError> {
        Client::builder(dialect)
            .acquirer(Arc::new(self.clone()))
            .build()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Executed>> {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn executed(&self) -> Vec<Executed> {
        self.lock().clone()
    }

    /// SQL text of every statement, in execution order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.sql.clone()).collect()
    }

    #[must_use]
    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn record(&self, connection: usize, sql: &str, params: &[Primitive]) -> Result<ResultSet, SqlFxError> {
        self.lock().push(Executed {
            sql: sql.to_string(),
            params: params.to_vec(),
            connection,
        });
        (self.handler)(sql, params)
    }
}

#[async_trait]
impl Acquire for RecordingAcquirer {
    async fn acquire(&self) -> Result<BoxedConnection, SqlFxError> {
        let id = self.acquired.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(RecordingConnection {
            owner: self.clone(),
            id,
        }))
    }
}

pub struct RecordingConnection {
    owner: RecordingAcquirer,
    id: usize,
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn execute_raw(
        &mut self,
        sql: &str,
        params: &[Primitive],
    ) -> Result<ResultSet, SqlFxError> {
        self.owner.record(self.id, sql, params)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlFxError> {
        self.owner.record(self.id, sql, &[]).map(|_| ())
    }
}

/// Result set with the given columns and rows.
#[must_use]
pub fn result_set(columns: &[&str], rows: Vec<Vec<Primitive>>) -> ResultSet {
    let mut rs = ResultSet::with_columns(
        columns.iter().map(ToString::to_string).collect(),
        rows.len(),
    );
    for row in rows {
        rs.push_values(row);
    }
    rs
}
