use std::str::FromStr;
use std::sync::Arc;

use super::driver::PgDriver;
use crate::client::Client;
use crate::error::SqlFxError;
use crate::pool::{Pool, PoolConfig};
use crate::transform::NameTransforms;
use crate::types::Dialect;

/// Connection settings for a PostgreSQL client.
///
/// Either a `url` or the discrete `host`/`port`/`dbname`/`user`/`password`
/// fields must be supplied; discrete fields override parts of the URL.
#[derive(Debug, Clone)]
pub struct PgOptions {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub pool: PoolConfig,
    pub transforms: NameTransforms,
}

impl PgOptions {
    #[must_use]
    pub fn builder() -> PgOptionsBuilder {
        PgOptionsBuilder::default()
    }

    /// Merge the URL and discrete fields into a tokio-postgres config.
    ///
    /// # Errors
    /// Returns `SqlFxError::ConfigError` if the URL does not parse or a
    /// required field is missing.
    pub fn to_pg_config(&self) -> Result<tokio_postgres::Config, SqlFxError> {
        let mut cfg = match &self.url {
            Some(url) => tokio_postgres::Config::from_str(url)
                .map_err(|e| SqlFxError::ConfigError(format!("invalid postgres url: {e}")))?,
            None => tokio_postgres::Config::new(),
        };
        if let Some(host) = &self.host {
            cfg.host(host);
        }
        if let Some(port) = self.port {
            cfg.port(port);
        }
        if let Some(dbname) = &self.dbname {
            cfg.dbname(dbname);
        }
        if let Some(user) = &self.user {
            cfg.user(user);
        }
        if let Some(password) = &self.password {
            cfg.password(password);
        }

        if cfg.get_hosts().is_empty() {
            return Err(SqlFxError::ConfigError("host is required".to_string()));
        }
        if cfg.get_dbname().is_none() {
            return Err(SqlFxError::ConfigError("dbname is required".to_string()));
        }
        if cfg.get_user().is_none() {
            return Err(SqlFxError::ConfigError("user is required".to_string()));
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PgOptionsBuilder {
    url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    dbname: Option<String>,
    user: Option<String>,
    password: Option<String>,
    pool: PoolConfig,
    transforms: NameTransforms,
}

impl PgOptionsBuilder {
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn transforms(mut self, transforms: NameTransforms) -> Self {
        self.transforms = transforms;
        self
    }

    /// # Errors
    /// Returns `SqlFxError::ConfigError` if connection details are missing or
    /// the pool settings are inconsistent.
    pub fn finish(self) -> Result<PgOptions, SqlFxError> {
        let opts = PgOptions {
            url: self.url,
            host: self.host,
            port: self.port,
            dbname: self.dbname,
            user: self.user,
            password: self.password,
            pool: self.pool,
            transforms: self.transforms,
        };
        opts.to_pg_config()?;
        opts.pool.validate()?;
        Ok(opts)
    }
}

impl Client {
    /// Connect a pooled PostgreSQL client.
    ///
    /// # Errors
    /// Returns `SqlFxError::ConfigError` for invalid options, or the error from
    /// opening the pool's initial connections.
    pub async fn postgres(opts: PgOptions) -> Result<Client, SqlFxError> {
        let cfg = opts.to_pg_config()?;
        let pool = Pool::new(PgDriver::new(cfg), opts.pool.clone()).await?;
        tracing::info!(
            max_size = opts.pool.max_size,
            min_size = opts.pool.min_size,
            "postgres pool ready"
        );
        Client::builder(Dialect::Postgres)
            .acquirer(Arc::new(pool))
            .transforms(opts.transforms)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_fields_are_enough() -> Result<(), SqlFxError> {
        let opts = PgOptions::builder()
            .host("localhost")
            .port(5432)
            .dbname("app")
            .user("app")
            .password("secret")
            .finish()?;
        let cfg = opts.to_pg_config()?;
        assert_eq!(cfg.get_dbname(), Some("app"));
        assert_eq!(cfg.get_ports(), &[5432]);
        Ok(())
    }

    #[test]
    fn fields_override_the_url() -> Result<(), SqlFxError> {
        let opts = PgOptions::builder()
            .url("postgres://app@db.internal:5433/app")
            .dbname("reporting")
            .finish()?;
        let cfg = opts.to_pg_config()?;
        assert_eq!(cfg.get_dbname(), Some("reporting"));
        assert_eq!(cfg.get_user(), Some("app"));
        Ok(())
    }

    #[test]
    fn missing_dbname_is_a_config_error() {
        let err = PgOptions::builder()
            .host("localhost")
            .user("app")
            .finish()
            .err();
        assert!(matches!(err, Some(SqlFxError::ConfigError(msg)) if msg.contains("dbname")));
    }

    #[test]
    fn bad_pool_sizes_are_rejected() {
        let err = PgOptions::builder()
            .url("postgres://app@localhost/app")
            .pool(PoolConfig::default().min_size(5).max_size(2))
            .finish()
            .err();
        assert!(matches!(err, Some(SqlFxError::ConfigError(_))));
    }
}
