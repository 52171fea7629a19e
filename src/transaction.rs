//! Nested transactions over one shared connection.
//!
//! The outermost [`Client::with_transaction`] checks out a connection and
//! issues `BEGIN`; nested calls on the client it hands out become savepoints
//! named after their depth (`sqlfx1`, `sqlfx2`, ...).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::client::Client;
use crate::connection::SharedConnection;
use crate::error::SqlFxError;
use crate::types::Dialect;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// The connection and nesting depth visible to statements of one
/// transaction scope.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    id: u64,
    conn: SharedConnection,
    depth: u32,
    /// One flag per enclosing scope, root first; set when that scope exits.
    finished: Vec<Arc<AtomicBool>>,
}

impl TransactionContext {
    /// Identifies the root transaction; shared by all its savepoints.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 0 for the root transaction, `n` inside the `n`-th savepoint.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub(crate) fn connection(&self) -> Result<&SharedConnection, SqlFxError> {
        if self.finished.iter().any(|f| f.load(Ordering::Acquire)) {
            return Err(SqlFxError::InvalidState(
                "transaction scope has already completed; its client can no longer run statements"
                    .to_string(),
            ));
        }
        Ok(&self.conn)
    }
}

/// Statements used to open, close and nest transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSql {
    pub begin: String,
    pub commit: String,
    pub rollback: String,
    /// Prefix of the savepoint statement; the savepoint name is appended.
    pub savepoint: String,
    /// Prefix of the rollback-to-savepoint statement; the name is appended.
    pub rollback_savepoint: String,
}

impl TransactionSql {
    #[must_use]
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Mssql => Self {
                begin: "BEGIN TRANSACTION".into(),
                commit: "COMMIT TRANSACTION".into(),
                rollback: "ROLLBACK TRANSACTION".into(),
                savepoint: "SAVE TRANSACTION".into(),
                rollback_savepoint: "ROLLBACK TRANSACTION".into(),
            },
            Dialect::Postgres | Dialect::Sqlite | Dialect::Mysql => Self {
                begin: "BEGIN".into(),
                commit: "COMMIT".into(),
                rollback: "ROLLBACK".into(),
                savepoint: "SAVEPOINT".into(),
                rollback_savepoint: "ROLLBACK TO SAVEPOINT".into(),
            },
        }
    }

    fn savepoint_statement(&self, name: &str) -> String {
        format!("{} {name}", self.savepoint)
    }

    fn rollback_savepoint_statement(&self, name: &str) -> String {
        format!("{} {name}", self.rollback_savepoint)
    }
}

/// Closes a scope on exit and rolls back when its future is dropped before
/// it finished.
struct RollbackOnDrop {
    conn: SharedConnection,
    rollback: String,
    root: bool,
    armed: bool,
    finished: Arc<AtomicBool>,
}

impl RollbackOnDrop {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RollbackOnDrop {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::Release);
        if !self.armed {
            return;
        }
        let conn = self.conn.clone();
        let rollback = std::mem::take(&mut self.rollback);
        let root = self.root;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = conn.execute_batch(&rollback).await {
                        tracing::warn!(error = %err, "rollback of cancelled transaction failed");
                    }
                    // The session may still be mid-statement from the cancelled scope.
                    if root {
                        conn.mark_broken().await;
                    }
                });
            }
            Err(_) => {
                tracing::warn!("transaction dropped outside a tokio runtime; not rolled back");
            }
        }
    }
}

impl Client {
    /// Run `operation` inside a transaction.
    ///
    /// At the top level this acquires a connection from the transaction
    /// acquirer and wraps `operation` in `BEGIN`/`COMMIT`, rolling back if it
    /// fails. Called on a client that is already inside a transaction, it
    /// wraps `operation` in a savepoint instead: failure rolls back to the
    /// savepoint, success leaves the commit to the outer scope.
    ///
    /// `operation` receives a client bound to the transaction; statements must
    /// go through it (or its clones) to take part in the transaction.
    ///
    /// ```rust,no_run
    /// # use sqlfx::prelude::*;
    /// # async fn demo(client: Client) -> Result<(), SqlFxError> {
    /// client
    ///     .with_transaction(|tx| async move {
    ///         tx.statement("INSERT INTO audit (msg) VALUES ('outer')").await?;
    ///         let inner = tx
    ///             .with_transaction(|sp| async move {
    ///                 sp.statement("INSERT INTO audit (msg) VALUES ('inner')").await?;
    ///                 Err::<(), _>(SqlFxError::sql("abandon inner work"))
    ///             })
    ///             .await;
    ///         assert!(inner.is_err());
    ///         Ok::<_, SqlFxError>(())
    ///     })
    ///     .await
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns the error of `operation`, or the error of `BEGIN`, `SAVEPOINT`
    /// or `COMMIT`. A failing rollback after a failed `operation` is logged
    /// and the original error is returned.
    pub async fn with_transaction<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SqlFxError>,
    {
        match self.transaction() {
            None => self.run_root(operation).await,
            Some(ctx) => self.run_savepoint(ctx.clone(), operation).await,
        }
    }

    async fn run_root<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SqlFxError>,
    {
        let sql = self.transaction_sql();
        let conn = SharedConnection::new(self.transaction_acquirer().acquire().await?);
        conn.execute_batch(&sql.begin).await?;

        let finished = Arc::new(AtomicBool::new(false));
        let ctx = TransactionContext {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
            conn: conn.clone(),
            depth: 0,
            finished: vec![Arc::clone(&finished)],
        };
        tracing::debug!(transaction = ctx.id, "transaction started");

        let mut guard = RollbackOnDrop {
            conn: conn.clone(),
            rollback: sql.rollback.clone(),
            root: true,
            armed: true,
            finished: Arc::clone(&finished),
        };
        let outcome = operation(self.in_context(ctx)).await;
        finished.store(true, Ordering::Release);

        let result = match outcome {
            Ok(value) => match conn.execute_batch(&sql.commit).await {
                Ok(()) => Ok(value),
                Err(commit_err) => {
                    rollback_quietly(&conn, &sql.rollback, true).await;
                    Err(commit_err.into())
                }
            },
            Err(err) => {
                rollback_quietly(&conn, &sql.rollback, true).await;
                Err(err)
            }
        };
        guard.disarm();
        result
    }

    async fn run_savepoint<F, Fut, T, E>(
        &self,
        parent: TransactionContext,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SqlFxError>,
    {
        let sql = self.transaction_sql();
        let depth = parent.depth + 1;
        let name = format!("sqlfx{depth}");
        let conn = parent.connection()?.clone();
        conn.execute_batch(&sql.savepoint_statement(&name)).await?;

        let rollback = sql.rollback_savepoint_statement(&name);
        let finished = Arc::new(AtomicBool::new(false));
        let mut guard = RollbackOnDrop {
            conn: conn.clone(),
            rollback: rollback.clone(),
            root: false,
            armed: true,
            finished: Arc::clone(&finished),
        };
        let mut scopes = parent.finished;
        scopes.push(Arc::clone(&finished));
        let ctx = TransactionContext {
            depth,
            finished: scopes,
            ..parent
        };
        let outcome = operation(self.in_context(ctx)).await;
        finished.store(true, Ordering::Release);

        if outcome.is_err() {
            rollback_quietly(&conn, &rollback, false).await;
        }
        guard.disarm();
        outcome
    }
}

/// Roll back after a failure, logging instead of returning rollback errors.
async fn rollback_quietly(conn: &SharedConnection, rollback: &str, root: bool) {
    if let Err(err) = conn.execute_batch(rollback).await {
        tracing::warn!(error = %err, statement = rollback, "rollback failed");
        // A connection in an unknown transaction state must not be reused.
        conn.mark_broken().await;
    } else if root {
        tracing::debug!("transaction rolled back");
    }
}
