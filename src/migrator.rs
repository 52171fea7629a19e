//! Ordered, apply-once schema migrations recorded in a tracking table.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use lazy_static::lazy_static;
use regex::Regex;

use crate::client::Client;
use crate::compiler::Compiler;
use crate::error::{MigrationErrorReason, SqlFxError};
use crate::types::{Dialect, Primitive};

lazy_static! {
    static ref MIGRATION_FILE: Regex = Regex::new(r"^(\d+)_([^.]+)\.sql$").expect("valid regex");
}

/// Code run by a migration defined in Rust.
pub type MigrationFn = Arc<dyn Fn(Client) -> BoxFuture<'static, Result<(), SqlFxError>> + Send + Sync>;

#[derive(Clone)]
pub enum MigrationSource {
    /// A script run with `execute_batch`.
    Sql(String),
    Run(MigrationFn),
}

impl fmt::Debug for MigrationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationSource::Sql(sql) => f.debug_tuple("Sql").field(sql).finish(),
            MigrationSource::Run(_) => f.write_str("Run(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub id: i64,
    pub name: String,
    pub source: MigrationSource,
}

impl Migration {
    #[must_use]
    pub fn sql(id: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            source: MigrationSource::Sql(sql.into()),
        }
    }

    pub fn run<F>(id: i64, name: impl Into<String>, run: F) -> Self
    where
        F: Fn(Client) -> BoxFuture<'static, Result<(), SqlFxError>> + Send + Sync + 'static,
    {
        Self {
            id,
            name: name.into(),
            source: MigrationSource::Run(Arc::new(run)),
        }
    }
}

/// Applies pending migrations inside a single transaction.
#[derive(Debug, Clone)]
pub struct Migrator {
    migrations: Vec<Migration>,
    table: String,
}

impl Migrator {
    #[must_use]
    pub fn from_migrations(migrations: Vec<Migration>) -> Self {
        Self {
            migrations,
            table: "sqlfx_migrations".to_string(),
        }
    }

    /// Load every `NNNN_name.sql` file in `dir`; other files are ignored.
    ///
    /// A missing or unreadable directory yields no migrations.
    ///
    /// # Errors
    /// Returns a migration `import-error` when a matching file cannot be read
    /// or its id does not fit in an `i64`.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, SqlFxError> {
        let dir = dir.as_ref();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "could not read migrations directory");
                return Ok(Self::from_migrations(Vec::new()));
            }
        };

        let mut migrations = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(caps) = MIGRATION_FILE.captures(file_name) else {
                continue;
            };
            let id: i64 = caps[1].parse().map_err(|e| {
                SqlFxError::migration(
                    MigrationErrorReason::ImportError,
                    format!("{file_name}: {e}"),
                )
            })?;
            let sql = std::fs::read_to_string(entry.path()).map_err(|e| {
                SqlFxError::migration(
                    MigrationErrorReason::ImportError,
                    format!("{file_name}: {e}"),
                )
            })?;
            migrations.push(Migration::sql(id, &caps[2], sql));
        }
        migrations.sort_by_key(|m| m.id);
        Ok(Self::from_migrations(migrations))
    }

    /// Name of the tracking table, `sqlfx_migrations` by default.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    #[must_use]
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Apply every migration newer than the latest recorded one.
    ///
    /// Returns the `(id, name)` of each applied migration, in order.
    ///
    /// # Errors
    /// Returns a migration error (`duplicates`, `bad-state` or `failed`) or
    /// the driver error of the bookkeeping statements. Nothing is recorded
    /// or kept when an error is returned.
    pub async fn run(&self, client: &Client) -> Result<Vec<(i64, String)>, SqlFxError> {
        self.check_duplicates()?;
        let dialect = client.dialect();
        // The tracking table name is used as given, without name transforms.
        let table = Compiler::new(dialect).quote_identifier(&self.table);

        client.execute_batch(&create_table_sql(dialect, &table)).await?;

        let applied = client
            .with_transaction(|tx| async move {
                if let Some(lock) = lock_table_sql(dialect, &table) {
                    tx.execute_batch(&lock).await?;
                }
                let latest = latest_id(&tx, &table).await?;

                let mut applied = Vec::new();
                let mut pending: Vec<&Migration> =
                    self.migrations.iter().filter(|m| m.id > latest).collect();
                pending.sort_by_key(|m| m.id);

                for migration in pending {
                    apply(&tx, migration).await.map_err(|e| {
                        SqlFxError::migration(
                            MigrationErrorReason::Failed,
                            format!("migration {} ({}) failed: {e}", migration.id, migration.name),
                        )
                    })?;
                    tx.execute_raw(
                        &insert_sql(dialect, &table),
                        &[
                            Primitive::Int(migration.id),
                            Primitive::Text(migration.name.clone()),
                        ],
                    )
                    .await?;
                    tracing::info!(
                        migration_id = migration.id,
                        migration_name = %migration.name,
                        "applied migration"
                    );
                    applied.push((migration.id, migration.name.clone()));
                }
                Ok::<_, SqlFxError>(applied)
            })
            .await?;

        tracing::info!(count = applied.len(), table = %self.table, "migrations complete");
        Ok(applied)
    }

    fn check_duplicates(&self) -> Result<(), SqlFxError> {
        let mut ids: Vec<i64> = self.migrations.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        let dupes: Vec<String> = ids
            .windows(2)
            .filter(|w| w[0] == w[1])
            .map(|w| w[0].to_string())
            .collect();
        if dupes.is_empty() {
            Ok(())
        } else {
            Err(SqlFxError::migration(
                MigrationErrorReason::Duplicates,
                format!("duplicate migration ids: {}", dupes.join(", ")),
            ))
        }
    }
}

async fn apply(tx: &Client, migration: &Migration) -> Result<(), SqlFxError> {
    match &migration.source {
        MigrationSource::Sql(sql) => tx.execute_batch(sql).await,
        MigrationSource::Run(run) => run(tx.clone()).await,
    }
}

async fn latest_id(tx: &Client, table: &str) -> Result<i64, SqlFxError> {
    let rows = tx
        .execute_raw(&format!("SELECT MAX(migration_id) AS latest FROM {table}"), &[])
        .await?;
    let Some(row) = rows.rows().first() else {
        return Ok(0);
    };
    match row.get_by_index(0) {
        None | Some(Primitive::Null) => Ok(0),
        Some(Primitive::Int(id)) => Ok(*id),
        Some(Primitive::Text(text)) => text.parse().map_err(|_| bad_state(text)),
        Some(other) => Err(bad_state(&format!("{other:?}"))),
    }
}

fn bad_state(found: &str) -> SqlFxError {
    SqlFxError::migration(
        MigrationErrorReason::BadState,
        format!("tracking table holds a malformed migration id: {found}"),
    )
}

fn create_table_sql(dialect: Dialect, table: &str) -> String {
    match dialect {
        Dialect::Mssql => format!(
            "IF OBJECT_ID(N'{}', N'U') IS NULL CREATE TABLE {table} (\
             migration_id BIGINT NOT NULL PRIMARY KEY, \
             name NVARCHAR(255) NOT NULL, \
             created_at DATETIME2 NOT NULL DEFAULT SYSUTCDATETIME())",
            table.replace('\'', "''")
        ),
        Dialect::Postgres | Dialect::Sqlite | Dialect::Mysql => format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             migration_id BIGINT NOT NULL PRIMARY KEY, \
             name TEXT NOT NULL, \
             created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)"
        ),
    }
}

fn lock_table_sql(dialect: Dialect, table: &str) -> Option<String> {
    match dialect {
        Dialect::Postgres => Some(format!("LOCK TABLE {table} IN ACCESS EXCLUSIVE MODE")),
        Dialect::Mssql => Some(format!("SELECT TOP 0 1 FROM {table} WITH (TABLOCKX, HOLDLOCK)")),
        Dialect::Mysql => Some(format!("SELECT migration_id FROM {table} FOR UPDATE")),
        // A write transaction already holds the database lock once it writes.
        Dialect::Sqlite => None,
    }
}

fn insert_sql(dialect: Dialect, table: &str) -> String {
    match dialect {
        Dialect::Postgres => format!("INSERT INTO {table} (migration_id, name) VALUES ($1, $2)"),
        Dialect::Mssql => format!("INSERT INTO {table} (migration_id, name) VALUES (@p1, @p2)"),
        Dialect::Sqlite | Dialect::Mysql => {
            format!("INSERT INTO {table} (migration_id, name) VALUES (?, ?)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_pattern_matches_numbered_scripts() {
        let caps = MIGRATION_FILE.captures("0002_add_people.sql");
        assert_eq!(caps.map(|c| c[2].to_string()), Some("add_people".to_string()));
        assert!(MIGRATION_FILE.captures("notes.sql").is_none());
        assert!(MIGRATION_FILE.captures("0003_drop.sql.bak").is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let migrator = Migrator::from_migrations(vec![
            Migration::sql(1, "a", "SELECT 1"),
            Migration::sql(1, "b", "SELECT 1"),
        ]);
        assert!(matches!(
            migrator.check_duplicates(),
            Err(SqlFxError::Migration {
                reason: MigrationErrorReason::Duplicates,
                ..
            })
        ));
    }

    #[test]
    fn missing_directory_yields_nothing() -> Result<(), SqlFxError> {
        let migrator = Migrator::from_directory("/definitely/not/a/dir")?;
        assert!(migrator.migrations().is_empty());
        Ok(())
    }
}
