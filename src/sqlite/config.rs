use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::worker::SqliteDriver;
use crate::client::Client;
use crate::error::SqlFxError;
use crate::pool::{Pool, PoolConfig};
use crate::transform::NameTransforms;
use crate::types::Dialect;

/// Options for configuring a `SQLite` client.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: PathBuf,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout: Duration,
    pub pool: PoolConfig,
    pub transforms: NameTransforms,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: Duration::from_secs(5),
            pool: PoolConfig::default(),
            transforms: NameTransforms::default(),
        }
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.opts.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.opts.pool = pool;
        self
    }

    #[must_use]
    pub fn transforms(mut self, transforms: NameTransforms) -> Self {
        self.opts.transforms = transforms;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Build a pooled client.
    ///
    /// # Errors
    /// Returns `SqlFxError` if the pool settings are invalid or the database
    /// cannot be opened.
    pub async fn build(self) -> Result<Client, SqlFxError> {
        Client::sqlite(self.finish()).await
    }
}

impl Client {
    #[must_use]
    pub fn sqlite_builder(db_path: impl Into<PathBuf>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    /// Open a pooled `SQLite` client.
    ///
    /// `:memory:` gives every pooled connection its own private database; use
    /// a file path when statements must see each other's writes.
    ///
    /// # Errors
    /// Returns `SqlFxError::ConfigError` for invalid pool settings or the
    /// open error from the initial connections.
    pub async fn sqlite(opts: SqliteOptions) -> Result<Client, SqlFxError> {
        let driver = SqliteDriver::new(opts.db_path.clone(), opts.busy_timeout);
        let pool = Pool::new(driver, opts.pool.clone()).await?;
        tracing::info!(
            path = %opts.db_path.display(),
            max_size = opts.pool.max_size,
            "sqlite pool ready"
        );
        Client::builder(Dialect::Sqlite)
            .acquirer(Arc::new(pool))
            .transforms(opts.transforms)
            .build()
    }
}
