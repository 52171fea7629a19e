use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::params::to_sqlite_values;
use super::query::{build_result_set, execute_statement};
use crate::error::SqlFxError;
use crate::pool::{Driver, DriverConnection};
use crate::results::ResultSet;
use crate::types::Primitive;

/// Opens SQLite connections for the pool, each on its own worker thread.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteDriver {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
        }
    }
}

impl Driver for SqliteDriver {
    type Conn = SqliteConnection;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Conn, SqlFxError>> + Send {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        async move {
            tracing::debug!(path = %path.display(), "opening sqlite connection");
            SqliteConnection::spawn(path, busy_timeout).await
        }
    }
}

enum Command {
    Execute {
        sql: String,
        params: Vec<rusqlite::types::Value>,
        respond_to: oneshot::Sender<Result<ResultSet, SqlFxError>>,
    },
    Batch {
        sql: String,
        respond_to: oneshot::Sender<Result<(), SqlFxError>>,
    },
}

/// Handle to a worker-owned rusqlite connection.
///
/// Dropping the handle closes the channel, which ends the worker thread and
/// closes the database handle.
pub struct SqliteConnection {
    sender: Sender<Command>,
    alive: Arc<AtomicBool>,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("alive", &self.alive.load(Ordering::Relaxed))
            .finish()
    }
}

impl SqliteConnection {
    async fn spawn(path: PathBuf, busy_timeout: Duration) -> Result<Self, SqlFxError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = oneshot::channel();
        let alive = Arc::new(AtomicBool::new(true));
        let worker_alive = Arc::clone(&alive);

        thread::Builder::new()
            .name("sqlfx-sqlite".to_string())
            .spawn(move || {
                match open(&path, busy_timeout) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        run_worker(&conn, &receiver);
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                    }
                }
                worker_alive.store(false, Ordering::Release);
            })?;

        ready_rx.await.map_err(|_| {
            SqlFxError::sql("sqlite worker exited before the connection opened")
        })??;
        Ok(Self { sender, alive })
    }

    fn send(&self, command: Command) -> Result<(), SqlFxError> {
        self.sender
            .send(command)
            .map_err(|_| SqlFxError::sql("sqlite worker closed"))
    }
}

fn open(path: &std::path::Path, busy_timeout: Duration) -> Result<rusqlite::Connection, SqlFxError> {
    let conn = rusqlite::Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    // journal_mode returns a row, so it cannot go through execute_batch
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    Ok(conn)
}

fn run_worker(conn: &rusqlite::Connection, receiver: &Receiver<Command>) {
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Execute {
                sql,
                params,
                respond_to,
            } => {
                let outcome = conn
                    .prepare(&sql)
                    .map_err(SqlFxError::from)
                    .and_then(|mut stmt| {
                        if stmt.column_count() == 0 {
                            execute_statement(&mut stmt, &params)
                        } else {
                            build_result_set(&mut stmt, &params)
                        }
                    });
                let _ = respond_to.send(outcome);
            }
            Command::Batch { sql, respond_to } => {
                let outcome = conn.execute_batch(&sql).map_err(SqlFxError::from);
                let _ = respond_to.send(outcome);
            }
        }
    }
}

#[async_trait]
impl DriverConnection for SqliteConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[Primitive],
    ) -> Result<ResultSet, SqlFxError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(Command::Execute {
            sql: sql.to_string(),
            params: to_sqlite_values(params),
            respond_to,
        })?;
        rx.await
            .map_err(|_| SqlFxError::sql("sqlite worker dropped while executing statement"))?
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlFxError> {
        let (respond_to, rx) = oneshot::channel();
        self.send(Command::Batch {
            sql: sql.to_string(),
            respond_to,
        })?;
        rx.await
            .map_err(|_| SqlFxError::sql("sqlite worker dropped while executing batch"))?
    }

    fn is_closed(&self) -> bool {
        !self.alive.load(Ordering::Acquire)
    }
}
