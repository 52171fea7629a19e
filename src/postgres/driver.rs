use std::future::Future;

use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use super::query::build_result_set;
use crate::error::SqlFxError;
use crate::pool::{Driver, DriverConnection};
use crate::results::ResultSet;
use crate::types::Primitive;

/// Opens tokio-postgres sessions for the pool.
#[derive(Debug, Clone)]
pub struct PgDriver {
    config: tokio_postgres::Config,
}

impl PgDriver {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self { config }
    }
}

impl Driver for PgDriver {
    type Conn = PgConnection;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Conn, SqlFxError>> + Send {
        let cfg = self.config.clone();
        async move {
            tracing::debug!(
                hosts = ?cfg.get_hosts(),
                dbname = ?cfg.get_dbname(),
                "connecting to postgres"
            );
            let (client, connection) = cfg.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(err) = connection.await {
                    tracing::warn!(error = %err, "postgres connection closed with error");
                }
            });
            Ok(PgConnection { client })
        }
    }
}

/// One tokio-postgres client.
pub struct PgConnection {
    client: Client,
}

#[async_trait]
impl DriverConnection for PgConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[Primitive],
    ) -> Result<ResultSet, SqlFxError> {
        let stmt = self.client.prepare(sql).await?;
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        if stmt.columns().is_empty() {
            let affected = self.client.execute(&stmt, &refs).await?;
            return Ok(ResultSet::affected(
                usize::try_from(affected).unwrap_or(usize::MAX),
            ));
        }

        let rows = self.client.query(&stmt, &refs).await?;
        build_result_set(&stmt, &rows)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlFxError> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), SqlFxError> {
        self.client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}
