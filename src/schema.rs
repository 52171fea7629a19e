//! Request/result validation with serde.
//!
//! Encoding turns a caller's input into the request shape a query expects;
//! decoding turns a result row into the caller's output type. Both go
//! through `serde_json::Value`, so any `Deserialize` validation on the target
//! type applies.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::Client;
use crate::error::{SchemaDirection, SqlFxError};
use crate::results::{ResultSet, Row};

/// Convert `input` into the request shape `II`.
///
/// # Errors
/// Returns `SqlFxError::Schema` with direction `Request` on failure.
pub fn encode<IA: Serialize, II: DeserializeOwned>(input: &IA) -> Result<II, SqlFxError> {
    let value =
        serde_json::to_value(input).map_err(|e| SqlFxError::schema(SchemaDirection::Request, e))?;
    serde_json::from_value(value).map_err(|e| SqlFxError::schema(SchemaDirection::Request, e))
}

/// Decode one result row into `A`.
///
/// # Errors
/// Returns `SqlFxError::Schema` with direction `Result` on failure.
pub fn decode<A: DeserializeOwned>(row: &Row) -> Result<A, SqlFxError> {
    let value =
        serde_json::to_value(row).map_err(|e| SqlFxError::schema(SchemaDirection::Result, e))?;
    serde_json::from_value(value).map_err(|e| SqlFxError::schema(SchemaDirection::Result, e))
}

/// Decode every row, collecting all failures into one error.
///
/// # Errors
/// Returns `SqlFxError::Schema` listing each row that failed.
pub fn decode_all<A: DeserializeOwned>(rows: &[Row]) -> Result<Vec<A>, SqlFxError> {
    let mut decoded = Vec::with_capacity(rows.len());
    let mut causes = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        match decode(row) {
            Ok(value) => decoded.push(value),
            Err(SqlFxError::Schema { causes: row_causes, .. }) => {
                causes.extend(row_causes.into_iter().map(|c| format!("row {i}: {c}")));
            }
            Err(other) => return Err(other),
        }
    }
    if causes.is_empty() {
        Ok(decoded)
    } else {
        Err(SqlFxError::Schema {
            direction: SchemaDirection::Result,
            causes,
        })
    }
}

/// Canonical text of `input`, used as a request-cache key.
///
/// Going through `Value` sorts object keys, so map inputs with the same
/// entries give the same key whatever their iteration order.
pub(crate) fn encode_key<IA: Serialize>(input: &IA) -> Result<String, SqlFxError> {
    let value = serde_json::to_value(input)
        .map_err(|e| SqlFxError::schema(SchemaDirection::Request, e))?;
    Ok(value.to_string())
}

impl Client {
    /// Encode `input`, run `query` with it and decode every row.
    ///
    /// # Errors
    /// Returns schema errors from either direction, or the query's error.
    pub async fn schema<IA, II, A, F, Fut>(&self, input: &IA, query: F) -> Result<Vec<A>, SqlFxError>
    where
        IA: Serialize,
        II: DeserializeOwned,
        A: DeserializeOwned,
        F: FnOnce(Client, II) -> Fut,
        Fut: Future<Output = Result<ResultSet, SqlFxError>>,
    {
        let request: II = encode(input)?;
        let rows = query(self.clone(), request).await?;
        decode_all(rows.rows())
    }

    /// Like [`schema`](Self::schema) but expects exactly one row.
    ///
    /// # Errors
    /// Returns `SqlFxError::ResultLengthMismatch` when the query returns no rows.
    pub async fn single_schema<IA, II, A, F, Fut>(&self, input: &IA, query: F) -> Result<A, SqlFxError>
    where
        IA: Serialize,
        II: DeserializeOwned,
        A: DeserializeOwned,
        F: FnOnce(Client, II) -> Fut,
        Fut: Future<Output = Result<ResultSet, SqlFxError>>,
    {
        self.single_schema_option(input, query)
            .await?
            .ok_or(SqlFxError::ResultLengthMismatch {
                expected: 1,
                actual: 0,
            })
    }

    /// Decode the first row if there is one.
    ///
    /// # Errors
    /// Returns schema errors from either direction, or the query's error.
    pub async fn single_schema_option<IA, II, A, F, Fut>(
        &self,
        input: &IA,
        query: F,
    ) -> Result<Option<A>, SqlFxError>
    where
        IA: Serialize,
        II: DeserializeOwned,
        A: DeserializeOwned,
        F: FnOnce(Client, II) -> Fut,
        Fut: Future<Output = Result<ResultSet, SqlFxError>>,
    {
        let request: II = encode(input)?;
        let rows = query(self.clone(), request).await?;
        rows.rows().first().map(decode::<A>).transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::types::Primitive;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        id: i64,
        name: String,
    }

    #[derive(Debug, Deserialize)]
    #[serde(try_from = "i64")]
    struct PositiveId(i64);

    impl TryFrom<i64> for PositiveId {
        type Error = String;
        fn try_from(value: i64) -> Result<Self, Self::Error> {
            if value > 0 { Ok(Self(value)) } else { Err(format!("{value} is not positive")) }
        }
    }

    fn row(id: Primitive, name: Primitive) -> Row {
        Row::new(Arc::new(vec!["id".into(), "name".into()]), vec![id, name])
    }

    #[test]
    fn decode_reads_named_columns() -> Result<(), SqlFxError> {
        let person: Person = decode(&row(Primitive::Int(1), Primitive::Text("Ada".into())))?;
        assert_eq!(person, Person { id: 1, name: "Ada".into() });
        Ok(())
    }

    #[test]
    fn decode_failure_is_a_result_schema_error() {
        let err = decode::<Person>(&row(Primitive::Text("x".into()), Primitive::Null)).err();
        assert!(matches!(
            err,
            Some(SqlFxError::Schema { direction: SchemaDirection::Result, .. })
        ));
    }

    #[test]
    fn encode_runs_target_validation() {
        assert!(encode::<i64, PositiveId>(&5).is_ok());
        let err = encode::<i64, PositiveId>(&-1).err();
        assert!(matches!(
            err,
            Some(SqlFxError::Schema { direction: SchemaDirection::Request, .. })
        ));
    }

    #[derive(Serialize)]
    struct NameFirst {
        name: &'static str,
        id: i64,
    }

    #[derive(Serialize)]
    struct IdFirst {
        id: i64,
        name: &'static str,
    }

    #[test]
    fn cache_key_ignores_field_order() -> Result<(), SqlFxError> {
        let by_name = encode_key(&NameFirst { name: "Ada", id: 1 })?;
        let by_id = encode_key(&IdFirst { id: 1, name: "Ada" })?;
        assert_eq!(by_name, by_id);
        assert_eq!(by_id, r#"{"id":1,"name":"Ada"}"#);

        let forward: HashMap<String, i64> = (0..32).map(|i| (format!("k{i}"), i)).collect();
        let backward: HashMap<String, i64> = (0..32).rev().map(|i| (format!("k{i}"), i)).collect();
        assert_eq!(encode_key(&forward)?, encode_key(&backward)?);
        Ok(())
    }
}
