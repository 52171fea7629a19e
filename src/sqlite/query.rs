use rusqlite::types::Value;
use rusqlite::{Statement, ToSql};

use crate::error::SqlFxError;
use crate::results::ResultSet;
use crate::types::Primitive;

fn extract_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<Primitive, SqlFxError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => Primitive::Null,
        Value::Integer(i) => Primitive::Int(i),
        Value::Real(f) => Primitive::Float(f),
        Value::Text(s) => Primitive::Text(s),
        Value::Blob(b) => Primitive::Bytes(b),
    })
}

/// Run a row-returning statement and collect every row.
///
/// # Errors
/// Returns `SqlFxError::Sql` if binding or stepping the statement fails.
pub fn build_result_set(stmt: &mut Statement<'_>, params: &[Value]) -> Result<ResultSet, SqlFxError> {
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let width = columns.len();
    let refs: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();

    let mut result_set = ResultSet::with_columns(columns, 10);
    let mut rows = stmt.query(&refs[..])?;
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| extract_value(row, i))
            .collect::<Result<Vec<_>, _>>()?;
        result_set.push_values(values);
    }
    Ok(result_set)
}

/// Run a statement without result columns and report the changed row count.
///
/// # Errors
/// Returns `SqlFxError::Sql` if the statement fails.
pub fn execute_statement(stmt: &mut Statement<'_>, params: &[Value]) -> Result<ResultSet, SqlFxError> {
    let refs: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
    let changed = stmt.execute(&refs[..])?;
    Ok(ResultSet::affected(changed))
}
