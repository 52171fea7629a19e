use std::future::IntoFuture;

use futures_util::future::{BoxFuture, FutureExt};

use super::Client;
use crate::compiler::CompiledStatement;
use crate::error::SqlFxError;
use crate::fragment::Fragment;
use crate::results::ResultSet;
use crate::transform::transform_result_set;
use crate::types::Primitive;

/// A fragment bound to a client. Compiles and runs only when awaited.
///
/// ```rust,no_run
/// # use sqlfx::prelude::*;
/// # async fn demo(client: Client) -> Result<(), SqlFxError> {
/// let rows = client
///     .statement(FragmentBuilder::new().sql("SELECT * FROM people WHERE id = ").bind(1))
///     .await?;
/// let raw = client.statement("SELECT 1 AS one").values().await?;
/// # let _ = (rows, raw);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Statement {
    client: Client,
    fragment: Fragment,
    transform: bool,
}

impl Statement {
    pub(crate) fn new(client: Client, fragment: Fragment) -> Self {
        Self {
            client,
            fragment,
            transform: true,
        }
    }

    #[must_use]
    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    /// Render the statement for the client's dialect without running it.
    ///
    /// # Errors
    /// See [`Compiler::compile`](crate::compiler::Compiler::compile).
    pub fn compile(&self) -> Result<CompiledStatement, SqlFxError> {
        self.client.compiler().compile(&self.fragment)
    }

    /// Keep the raw column names even if the client renames result columns.
    #[must_use]
    pub fn without_transform(mut self) -> Self {
        self.transform = false;
        self
    }

    /// Run the statement and return its rows.
    ///
    /// # Errors
    /// Returns compile, acquire and driver errors.
    pub async fn fetch(self) -> Result<ResultSet, SqlFxError> {
        let compiled = self.compile()?;
        let result = self.client.run(&compiled).await?;
        match self.client.result_transform() {
            Some(transform) if self.transform => Ok(transform_result_set(result, transform)),
            _ => Ok(result),
        }
    }

    /// Run the statement and return each row as a positional value list.
    ///
    /// # Errors
    /// Returns compile, acquire and driver errors.
    pub async fn values(self) -> Result<Vec<Vec<Primitive>>, SqlFxError> {
        let result = self.without_transform().fetch().await?;
        Ok(result.into_values())
    }

    /// Run the statement and return the number of affected rows.
    ///
    /// # Errors
    /// Returns compile, acquire and driver errors.
    pub async fn execute(self) -> Result<usize, SqlFxError> {
        let result = self.without_transform().fetch().await?;
        Ok(result.rows_affected())
    }
}

impl IntoFuture for Statement {
    type Output = Result<ResultSet, SqlFxError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.fetch().boxed()
    }
}
