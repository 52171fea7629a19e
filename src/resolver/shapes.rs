//! Batch functions for each resolver shape.
//!
//! Encoding failures and failed batch runs fail every request of the batch;
//! a row that fails to decode only fails the request it belongs to.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures_util::future::{FutureExt, join_all};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::batch::BatchFn;
use crate::client::Client;
use crate::error::SqlFxError;
use crate::results::{ResultSet, Row};
use crate::schema::{decode, encode};

fn encode_batch<IA: Serialize, II: DeserializeOwned>(inputs: &[IA]) -> Result<Vec<II>, SqlFxError> {
    inputs.iter().map(encode::<IA, II>).collect()
}

fn fail_all<T>(count: usize, err: &SqlFxError) -> Vec<Result<T, SqlFxError>> {
    (0..count).map(|_| Err(err.clone())).collect()
}

/// Group request indices by key so duplicate keys share matched rows.
fn index_by_key<K: Eq + Hash>(keys: Vec<K>) -> HashMap<K, Vec<usize>> {
    let mut waiting: HashMap<K, Vec<usize>> = HashMap::with_capacity(keys.len());
    for (i, key) in keys.into_iter().enumerate() {
        waiting.entry(key).or_default().push(i);
    }
    waiting
}

/// Row `i` answers request `i`; any other row count fails the whole batch.
pub(crate) fn positional<IA, II, A, F, Fut>(run: F) -> BatchFn<IA, A>
where
    IA: Serialize + Send + 'static,
    II: DeserializeOwned + Send + 'static,
    A: DeserializeOwned + Send + 'static,
    F: Fn(Client, Vec<II>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResultSet, SqlFxError>> + Send + 'static,
{
    Arc::new(move |client: Client, inputs: Vec<IA>| {
        let count = inputs.len();
        let query = encode_batch::<IA, II>(&inputs).map(|encoded| run(client, encoded));
        async move {
            let rows = match query {
                Ok(query) => match query.await {
                    Ok(result) => result.into_rows(),
                    Err(err) => return fail_all(count, &err),
                },
                Err(err) => return fail_all(count, &err),
            };
            if rows.len() != count {
                return fail_all(
                    count,
                    &SqlFxError::ResultLengthMismatch {
                        expected: count,
                        actual: rows.len(),
                    },
                );
            }
            rows.iter().map(decode::<A>).collect()
        }
        .boxed()
    })
}

/// Each request runs its own query; `finish` turns its rows into the answer.
pub(crate) fn per_request<IA, II, T, F, Fut>(
    run: F,
    finish: fn(ResultSet) -> Result<T, SqlFxError>,
) -> BatchFn<IA, T>
where
    IA: Serialize + Send + 'static,
    II: DeserializeOwned + Send + 'static,
    T: Send + 'static,
    F: Fn(Client, II) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResultSet, SqlFxError>> + Send + 'static,
{
    Arc::new(move |client: Client, inputs: Vec<IA>| {
        let count = inputs.len();
        let queries = encode_batch::<IA, II>(&inputs).map(|encoded| {
            encoded
                .into_iter()
                .map(|request| run(client.clone(), request))
                .collect::<Vec<_>>()
        });
        async move {
            match queries {
                Ok(queries) => join_all(queries)
                    .await
                    .into_iter()
                    .map(|result| result.and_then(finish))
                    .collect(),
                Err(err) => fail_all(count, &err),
            }
        }
        .boxed()
    })
}

pub(crate) fn first_row<A: DeserializeOwned>(result: ResultSet) -> Result<A, SqlFxError> {
    match result.rows().first() {
        Some(row) => decode(row),
        None => Err(SqlFxError::ResultLengthMismatch {
            expected: 1,
            actual: 0,
        }),
    }
}

pub(crate) fn first_row_option<A: DeserializeOwned>(
    result: ResultSet,
) -> Result<Option<A>, SqlFxError> {
    result.rows().first().map(decode::<A>).transpose()
}

/// The batch succeeds or fails as a unit; rows are ignored.
pub(crate) fn void<IA, II, F, Fut>(run: F) -> BatchFn<IA, ()>
where
    IA: Serialize + Send + 'static,
    II: DeserializeOwned + Send + 'static,
    F: Fn(Client, Vec<II>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResultSet, SqlFxError>> + Send + 'static,
{
    Arc::new(move |client: Client, inputs: Vec<IA>| {
        let count = inputs.len();
        let query = encode_batch::<IA, II>(&inputs).map(|encoded| run(client, encoded));
        async move {
            let outcome = match query {
                Ok(query) => query.await.map(|_| ()),
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => (0..count).map(|_| Ok(())).collect(),
                Err(err) => fail_all(count, &err),
            }
        }
        .boxed()
    })
}

/// Rows are matched to requests by key. The first row for a key answers
/// every request with that key; requests without a row get `None`.
pub(crate) fn by_id<IA, II, A, K, F, Fut, QK, RK>(
    run: F,
    request_key: QK,
    result_key: RK,
) -> BatchFn<IA, Option<A>>
where
    IA: Serialize + Send + 'static,
    II: DeserializeOwned + Send + 'static,
    A: DeserializeOwned + Clone + Send + 'static,
    K: Eq + Hash + Send + 'static,
    F: Fn(Client, Vec<II>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResultSet, SqlFxError>> + Send + 'static,
    QK: Fn(&IA) -> K + Send + Sync + 'static,
    RK: Fn(&Row) -> Option<K> + Send + Sync + 'static,
{
    let result_key = Arc::new(result_key);
    Arc::new(move |client: Client, inputs: Vec<IA>| {
        let count = inputs.len();
        let keys: Vec<K> = inputs.iter().map(&request_key).collect();
        let query = encode_batch::<IA, II>(&inputs).map(|encoded| run(client, encoded));
        let result_key = Arc::clone(&result_key);
        async move {
            let rows = match query {
                Ok(query) => match query.await {
                    Ok(result) => result.into_rows(),
                    Err(err) => return fail_all(count, &err),
                },
                Err(err) => return fail_all(count, &err),
            };

            let extract = &*result_key;
            let mut waiting = index_by_key(keys);
            let mut results: Vec<Result<Option<A>, SqlFxError>> =
                (0..count).map(|_| Ok(None)).collect();
            for row in &rows {
                let Some(key) = extract(row) else {
                    continue;
                };
                // Later rows for an already answered key are ignored.
                let Some(indices) = waiting.remove(&key) else {
                    continue;
                };
                let decoded = decode::<A>(row).map(Some);
                for i in indices {
                    results[i] = decoded.clone();
                }
            }
            results
        }
        .boxed()
    })
}

/// Rows are grouped by key; each request gets every row sharing its key, in
/// row order. A row that fails to decode fails its key's requests and later
/// rows for that key are skipped.
pub(crate) fn by_id_many<IA, II, A, K, F, Fut, QK, RK>(
    run: F,
    request_key: QK,
    result_key: RK,
) -> BatchFn<IA, Vec<A>>
where
    IA: Serialize + Send + 'static,
    II: DeserializeOwned + Send + 'static,
    A: DeserializeOwned + Clone + Send + 'static,
    K: Eq + Hash + Send + 'static,
    F: Fn(Client, Vec<II>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResultSet, SqlFxError>> + Send + 'static,
    QK: Fn(&IA) -> K + Send + Sync + 'static,
    RK: Fn(&Row) -> Option<K> + Send + Sync + 'static,
{
    let result_key = Arc::new(result_key);
    Arc::new(move |client: Client, inputs: Vec<IA>| {
        let count = inputs.len();
        let keys: Vec<K> = inputs.iter().map(&request_key).collect();
        let query = encode_batch::<IA, II>(&inputs).map(|encoded| run(client, encoded));
        let result_key = Arc::clone(&result_key);
        async move {
            let rows = match query {
                Ok(query) => match query.await {
                    Ok(result) => result.into_rows(),
                    Err(err) => return fail_all(count, &err),
                },
                Err(err) => return fail_all(count, &err),
            };

            let extract = &*result_key;
            let waiting = index_by_key(keys);
            let mut results: Vec<Result<Vec<A>, SqlFxError>> =
                (0..count).map(|_| Ok(Vec::new())).collect();
            for row in &rows {
                let Some(indices) = extract(row).and_then(|key| waiting.get(&key)) else {
                    continue;
                };
                let decoded = decode::<A>(row);
                for &i in indices {
                    let slot = &mut results[i];
                    match &decoded {
                        Ok(value) => {
                            if let Ok(found) = slot {
                                found.push(value.clone());
                            }
                        }
                        Err(err) => {
                            if slot.is_ok() {
                                *slot = Err(err.clone());
                            }
                        }
                    }
                }
            }
            results
        }
        .boxed()
    })
}
