//! The caller-facing client: statements, transactions and resolvers all hang
//! off [`Client`].

mod statement;

pub use statement::Statement;

use std::fmt;
use std::sync::Arc;

use crate::compiler::{CompiledStatement, Compiler, PlaceholderStyle};
use crate::connection::Acquire;
use crate::error::SqlFxError;
use crate::fragment::Fragment;
use crate::resolver::RequestCache;
use crate::results::ResultSet;
use crate::transaction::{TransactionContext, TransactionSql};
use crate::transform::{NameTransform, NameTransforms};
use crate::types::{Dialect, Primitive};

struct ClientInner {
    compiler: Compiler,
    acquirer: Arc<dyn Acquire>,
    transaction_acquirer: Arc<dyn Acquire>,
    transaction_sql: TransactionSql,
    result_transform: Option<NameTransform>,
}

/// Entry point for running SQL.
///
/// Cloning is cheap. A client handed out by [`Client::with_transaction`]
/// carries that transaction; every statement it runs uses the transaction's
/// connection. Other clients acquire a connection per statement.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
    tx: Option<TransactionContext>,
    cache: RequestCache,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("dialect", &self.dialect())
            .field("transaction", &self.tx)
            .finish_non_exhaustive()
    }
}

impl Client {
    #[must_use]
    pub fn builder(dialect: Dialect) -> ClientBuilder {
        ClientBuilder::new(dialect)
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.inner.compiler.dialect()
    }

    #[must_use]
    pub fn compiler(&self) -> &Compiler {
        &self.inner.compiler
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Savepoint depth of the current scope, `None` outside transactions.
    #[must_use]
    pub fn transaction_depth(&self) -> Option<u32> {
        self.tx.as_ref().map(TransactionContext::depth)
    }

    #[must_use]
    pub fn transaction(&self) -> Option<&TransactionContext> {
        self.tx.as_ref()
    }

    /// A lazily compiled statement; nothing runs until it is awaited.
    #[must_use]
    pub fn statement(&self, fragment: impl Into<Fragment>) -> Statement {
        Statement::new(self.clone(), fragment.into())
    }

    /// Statement made of pre-rendered SQL and parameters, bypassing the
    /// compiler. Placeholders must already match the dialect.
    #[must_use]
    pub fn unsafe_sql(&self, sql: impl Into<String>, params: Vec<Primitive>) -> Statement {
        self.statement(Fragment::unsafe_sql(sql, params))
    }

    /// Run SQL text with positional parameters on the current connection.
    ///
    /// # Errors
    /// Returns the acquire or driver error.
    pub async fn execute_raw(
        &self,
        sql: &str,
        params: &[Primitive],
    ) -> Result<ResultSet, SqlFxError> {
        let compiled = CompiledStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        self.run(&compiled).await
    }

    /// Run a parameterless multi-statement script.
    ///
    /// # Errors
    /// Returns the acquire or driver error.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), SqlFxError> {
        tracing::debug!(dialect = %self.dialect(), in_transaction = self.in_transaction(), "executing batch");
        match &self.tx {
            Some(ctx) => ctx.connection()?.execute_batch(sql).await,
            None => {
                let mut conn = self.inner.acquirer.acquire().await?;
                conn.execute_batch(sql).await
            }
        }
    }

    /// The request cache resolvers created from this client use.
    #[must_use]
    pub fn request_cache(&self) -> &RequestCache {
        &self.cache
    }

    /// A client identical to this one but using `cache` for resolver
    /// deduplication, e.g. a fresh cache per incoming request.
    #[must_use]
    pub fn with_request_cache(&self, cache: RequestCache) -> Client {
        Client {
            inner: Arc::clone(&self.inner),
            tx: self.tx.clone(),
            cache,
        }
    }

    /// Execute on the transaction connection if there is one, otherwise on a
    /// connection acquired for this statement alone.
    pub(crate) async fn run(&self, compiled: &CompiledStatement) -> Result<ResultSet, SqlFxError> {
        tracing::debug!(
            dialect = %self.dialect(),
            params = compiled.params.len(),
            transaction = self.tx.as_ref().map(TransactionContext::id),
            "executing statement"
        );
        match &self.tx {
            Some(ctx) => {
                ctx.connection()?
                    .execute_raw(&compiled.sql, &compiled.params)
                    .await
            }
            None => {
                let mut conn = self.inner.acquirer.acquire().await?;
                conn.execute_raw(&compiled.sql, &compiled.params).await
            }
        }
    }

    pub(crate) fn result_transform(&self) -> Option<&NameTransform> {
        self.inner.result_transform.as_ref()
    }

    pub(crate) fn transaction_sql(&self) -> &TransactionSql {
        &self.inner.transaction_sql
    }

    pub(crate) fn transaction_acquirer(&self) -> &Arc<dyn Acquire> {
        &self.inner.transaction_acquirer
    }

    pub(crate) fn in_context(&self, ctx: TransactionContext) -> Client {
        Client {
            inner: Arc::clone(&self.inner),
            tx: Some(ctx),
            cache: self.cache.clone(),
        }
    }
}

/// Assembles a [`Client`] around any [`Acquire`] implementation.
pub struct ClientBuilder {
    dialect: Dialect,
    acquirer: Option<Arc<dyn Acquire>>,
    transaction_acquirer: Option<Arc<dyn Acquire>>,
    transaction_sql: Option<TransactionSql>,
    transforms: NameTransforms,
    placeholder: Option<PlaceholderStyle>,
    cache: Option<RequestCache>,
}

impl ClientBuilder {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            acquirer: None,
            transaction_acquirer: None,
            transaction_sql: None,
            transforms: NameTransforms::default(),
            placeholder: None,
            cache: None,
        }
    }

    /// Source of connections for statements outside transactions.
    #[must_use]
    pub fn acquirer(mut self, acquirer: Arc<dyn Acquire>) -> Self {
        self.acquirer = Some(acquirer);
        self
    }

    /// Source of connections for root transactions. Defaults to the general
    /// acquirer; a checked-out connection is held for the whole transaction
    /// either way.
    #[must_use]
    pub fn transaction_acquirer(mut self, acquirer: Arc<dyn Acquire>) -> Self {
        self.transaction_acquirer = Some(acquirer);
        self
    }

    #[must_use]
    pub fn transaction_sql(mut self, sql: TransactionSql) -> Self {
        self.transaction_sql = Some(sql);
        self
    }

    #[must_use]
    pub fn transforms(mut self, transforms: NameTransforms) -> Self {
        self.transforms = transforms;
        self
    }

    #[must_use]
    pub fn transform_query_names(mut self, transform: NameTransform) -> Self {
        self.transforms.query = Some(transform);
        self
    }

    #[must_use]
    pub fn transform_result_names(mut self, transform: NameTransform) -> Self {
        self.transforms.result = Some(transform);
        self
    }

    #[must_use]
    pub fn placeholder_style(mut self, placeholder: PlaceholderStyle) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    #[must_use]
    pub fn request_cache(mut self, cache: RequestCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// # Errors
    /// Returns `SqlFxError::ConfigError` when no acquirer was supplied.
    pub fn build(self) -> Result<Client, SqlFxError> {
        let acquirer = self.acquirer.ok_or_else(|| {
            SqlFxError::ConfigError("a connection acquirer is required".to_string())
        })?;
        let transaction_acquirer = self
            .transaction_acquirer
            .unwrap_or_else(|| Arc::clone(&acquirer));

        let mut compiler = Compiler::new(self.dialect);
        if let Some(placeholder) = self.placeholder {
            compiler = compiler.with_placeholder_style(placeholder);
        }
        if let Some(transform) = self.transforms.query {
            compiler = compiler.with_transform(transform);
        }

        Ok(Client {
            inner: Arc::new(ClientInner {
                compiler,
                acquirer,
                transaction_acquirer,
                transaction_sql: self
                    .transaction_sql
                    .unwrap_or_else(|| TransactionSql::for_dialect(self.dialect)),
                result_transform: self.transforms.result,
            }),
            tx: None,
            cache: self.cache.unwrap_or_default(),
        })
    }
}
