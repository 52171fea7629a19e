//! Batched, deduplicated, cached lookups.
//!
//! A [`Resolver`] turns many concurrent `execute` calls into one query per
//! batch and matches the rows back to each caller, either by position or by
//! an identity key. Identical concurrent requests share one result through
//! the client's [`RequestCache`].

mod batch;
mod cache;
mod shapes;

pub use cache::RequestCache;

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use batch::Batcher;
use cache::{CacheKey, CachedValue};

use crate::client::Client;
use crate::error::SqlFxError;
use crate::results::{ResultSet, Row};
use crate::schema::encode_key;

/// Handle for one batched lookup.
///
/// `I` is the caller's request type, `A` the answer each request receives.
pub struct Resolver<I, A> {
    tag: Arc<str>,
    batcher: Arc<Batcher<I, A>>,
    client: Client,
}

impl<I, A> Clone for Resolver<I, A> {
    fn clone(&self) -> Self {
        Self {
            tag: Arc::clone(&self.tag),
            batcher: Arc::clone(&self.batcher),
            client: self.client.clone(),
        }
    }
}

impl<I, A> fmt::Debug for Resolver<I, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl<I, A> Resolver<I, A>
where
    I: Serialize + Send + 'static,
    A: Clone + Send + Sync + 'static,
{
    fn new(client: &Client, tag: &str, run: batch::BatchFn<I, A>) -> Self {
        Self {
            tag: Arc::from(tag),
            batcher: Arc::new(Batcher::new(run)),
            client: client.clone(),
        }
    }

    /// Identifies this resolver in the request cache.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Wait `window` after the first request before running a batch, so
    /// requests spread over that time are combined.
    #[must_use]
    pub fn with_batch_window(self, window: Duration) -> Self {
        let batcher = self
            .batcher
            .reconfigure(Some(window), self.batcher.max_batch_size());
        Self {
            batcher: Arc::new(batcher),
            ..self
        }
    }

    /// Split batches larger than `size` into several queries.
    #[must_use]
    pub fn with_max_batch_size(self, size: usize) -> Self {
        let batcher = self
            .batcher
            .reconfigure(self.batcher.window(), Some(size));
        Self {
            batcher: Arc::new(batcher),
            ..self
        }
    }

    /// Resolve `input` with the client this resolver was created from.
    ///
    /// # Errors
    /// Returns the error assigned to this request by its batch.
    pub async fn execute(&self, input: I) -> Result<A, SqlFxError> {
        self.execute_in(&self.client, input).await
    }

    /// Resolve `input` through `client`: its transaction and its request
    /// cache are used.
    ///
    /// # Errors
    /// Returns the error assigned to this request by its batch, or
    /// `SqlFxError::Schema` if `input` cannot be serialized.
    pub async fn execute_in(&self, client: &Client, input: I) -> Result<A, SqlFxError> {
        let key = self.key(client, &input)?;
        let cache = client.request_cache();
        let (id, slot) = cache
            .lookup_or_insert(key.clone(), || {
                let receiver = self.batcher.enqueue(client.clone(), input);
                async move {
                    match receiver.await {
                        Ok(result) => result.map(|value| Arc::new(value) as CachedValue),
                        Err(_) => Err(SqlFxError::InvalidState(
                            "resolver batch ended without delivering a result".to_string(),
                        )),
                    }
                }
            })
            .into_parts();

        let value = match slot.await {
            Ok(value) => value,
            Err(err) => {
                cache.evict_failed(&key, id);
                return Err(err);
            }
        };
        value.downcast::<A>().map(|a| (*a).clone()).map_err(|_| {
            SqlFxError::ConfigError(format!(
                "resolver tag `{}` is used by resolvers with different result types",
                self.tag
            ))
        })
    }

    /// Seed the cache so `execute(input)` returns `value` without a query.
    ///
    /// # Errors
    /// Returns `SqlFxError::Schema` if `input` cannot be serialized.
    pub fn populate_cache(&self, input: &I, value: A) -> Result<(), SqlFxError> {
        let key = self.key(&self.client, input)?;
        self.client.request_cache().populate(key, Arc::new(value));
        Ok(())
    }

    /// Forget any cached result for `input`; the next call queries again.
    ///
    /// # Errors
    /// Returns `SqlFxError::Schema` if `input` cannot be serialized.
    pub fn invalidate_cache(&self, input: &I) -> Result<(), SqlFxError> {
        let key = self.key(&self.client, input)?;
        self.client.request_cache().invalidate(&key);
        Ok(())
    }

    fn key(&self, client: &Client, input: &I) -> Result<CacheKey, SqlFxError> {
        Ok(CacheKey {
            tag: Arc::clone(&self.tag),
            transaction: client.transaction().map(|ctx| ctx.id()),
            input: encode_key(input)?,
        })
    }
}

impl Client {
    /// One row per request, in request order.
    ///
    /// `run` receives every encoded request of the batch and must return
    /// exactly one row per request; any other count fails the whole batch
    /// with `ResultLengthMismatch`.
    pub fn resolver<IA, II, A, F, Fut>(&self, tag: &str, run: F) -> Resolver<IA, A>
    where
        IA: Serialize + Send + 'static,
        II: DeserializeOwned + Send + 'static,
        A: DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(Client, Vec<II>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResultSet, SqlFxError>> + Send + 'static,
    {
        Resolver::new(self, tag, shapes::positional::<IA, II, A, F, Fut>(run))
    }

    /// One query per request, first row decoded; no rows is a
    /// `ResultLengthMismatch { expected: 1, actual: 0 }`.
    pub fn single_resolver<IA, II, A, F, Fut>(&self, tag: &str, run: F) -> Resolver<IA, A>
    where
        IA: Serialize + Send + 'static,
        II: DeserializeOwned + Send + 'static,
        A: DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(Client, II) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResultSet, SqlFxError>> + Send + 'static,
    {
        Resolver::new(
            self,
            tag,
            shapes::per_request::<IA, II, A, F, Fut>(run, shapes::first_row::<A>),
        )
    }

    /// One query per request, first row decoded if there is one.
    pub fn single_resolver_option<IA, II, A, F, Fut>(
        &self,
        tag: &str,
        run: F,
    ) -> Resolver<IA, Option<A>>
    where
        IA: Serialize + Send + 'static,
        II: DeserializeOwned + Send + 'static,
        A: DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(Client, II) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResultSet, SqlFxError>> + Send + 'static,
    {
        Resolver::new(
            self,
            tag,
            shapes::per_request::<IA, II, Option<A>, F, Fut>(run, shapes::first_row_option::<A>),
        )
    }

    /// Side effects only: the whole batch succeeds or fails together.
    pub fn void_resolver<IA, II, F, Fut>(&self, tag: &str, run: F) -> Resolver<IA, ()>
    where
        IA: Serialize + Send + 'static,
        II: DeserializeOwned + Send + 'static,
        F: Fn(Client, Vec<II>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResultSet, SqlFxError>> + Send + 'static,
    {
        Resolver::new(self, tag, shapes::void::<IA, II, F, Fut>(run))
    }

    /// Zero or one row per request, matched by key.
    ///
    /// `request_key` and `result_key` must produce equal keys for a request
    /// and the row that answers it; rows whose key matches no request are
    /// ignored.
    pub fn id_resolver<IA, II, A, K, F, Fut, QK, RK>(
        &self,
        tag: &str,
        request_key: QK,
        result_key: RK,
        run: F,
    ) -> Resolver<IA, Option<A>>
    where
        IA: Serialize + Send + 'static,
        II: DeserializeOwned + Send + 'static,
        A: DeserializeOwned + Clone + Send + Sync + 'static,
        K: Eq + Hash + Send + 'static,
        F: Fn(Client, Vec<II>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResultSet, SqlFxError>> + Send + 'static,
        QK: Fn(&IA) -> K + Send + Sync + 'static,
        RK: Fn(&Row) -> Option<K> + Send + Sync + 'static,
    {
        Resolver::new(
            self,
            tag,
            shapes::by_id::<IA, II, A, K, F, Fut, QK, RK>(run, request_key, result_key),
        )
    }

    /// Every row sharing a request's key, in row order; no rows gives an
    /// empty list.
    pub fn id_resolver_many<IA, II, A, K, F, Fut, QK, RK>(
        &self,
        tag: &str,
        request_key: QK,
        result_key: RK,
        run: F,
    ) -> Resolver<IA, Vec<A>>
    where
        IA: Serialize + Send + 'static,
        II: DeserializeOwned + Send + 'static,
        A: DeserializeOwned + Clone + Send + Sync + 'static,
        K: Eq + Hash + Send + 'static,
        F: Fn(Client, Vec<II>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResultSet, SqlFxError>> + Send + 'static,
        QK: Fn(&IA) -> K + Send + Sync + 'static,
        RK: Fn(&Row) -> Option<K> + Send + Sync + 'static,
    {
        Resolver::new(
            self,
            tag,
            shapes::by_id_many::<IA, II, A, K, F, Fut, QK, RK>(run, request_key, result_key),
        )
    }
}
