use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tokio_postgres::{Row, Statement};

use crate::error::SqlFxError;
use crate::results::ResultSet;
use crate::types::Primitive;

/// Build a result set from the rows of a prepared statement.
///
/// Column names come from the statement, so an empty result still reports them.
///
/// # Errors
/// Returns `SqlFxError::Sql` if a column cannot be read.
pub fn build_result_set(stmt: &Statement, rows: &[Row]) -> Result<ResultSet, SqlFxError> {
    let columns: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let col_count = columns.len();
    let mut result_set = ResultSet::with_columns(columns, rows.len());

    for row in rows {
        let mut values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            values.push(extract_value(row, idx)?);
        }
        result_set.push_values(values);
    }

    Ok(result_set)
}

/// Read column `idx` of `row` as a `Primitive`, based on the column type name.
///
/// # Errors
/// Returns `SqlFxError::Sql` if the value cannot be decoded.
pub fn extract_value(row: &Row, idx: usize) -> Result<Primitive, SqlFxError> {
    let type_name = row.columns()[idx].type_().name();

    let value = match type_name {
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| Primitive::Int(i64::from(v))),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| Primitive::Int(i64::from(v))),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(Primitive::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Primitive::Float(f64::from(v))),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(Primitive::Float),
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(Primitive::Bool),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(Primitive::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| Primitive::Timestamp(v.naive_utc())),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| Primitive::Timestamp(v.and_time(chrono::NaiveTime::MIN))),
        "json" | "jsonb" => row.try_get::<_, Option<Value>>(idx)?.map(Primitive::Json),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Primitive::Bytes),
        // Everything else is read as text; non-text types surface a decode error.
        _ => row.try_get::<_, Option<String>>(idx)?.map(Primitive::Text),
    };

    Ok(value.unwrap_or(Primitive::Null))
}
