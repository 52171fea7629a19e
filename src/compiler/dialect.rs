use super::{Emitter, shared_columns};
use crate::error::SqlFxError;
use crate::fragment::{Custom, Record};
use crate::types::{Dialect, Primitive};

pub(super) fn render_custom(out: &mut Emitter<'_>, custom: &Custom) -> Result<(), SqlFxError> {
    match out.dialect() {
        Dialect::Postgres => postgres(out, custom),
        Dialect::Sqlite => sqlite(out, custom),
        Dialect::Mysql => mysql(out, custom),
        Dialect::Mssql => mssql(out, custom),
    }
}

fn postgres(out: &mut Emitter<'_>, custom: &Custom) -> Result<(), SqlFxError> {
    match custom {
        Custom::Json(doc) => {
            out.bind(Primitive::Json(doc.clone()));
            Ok(())
        }
        Custom::Array(items) => {
            out.push_str("ARRAY [");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.bind(item.clone());
            }
            out.push_str("]");
            Ok(())
        }
        Custom::Values { rows, alias } => values_table(out, rows, alias),
    }
}

fn sqlite(out: &mut Emitter<'_>, custom: &Custom) -> Result<(), SqlFxError> {
    match custom {
        Custom::Json(doc) => {
            out.bind(Primitive::Text(doc.to_string()));
            Ok(())
        }
        Custom::Array(_) => Err(unsupported(Dialect::Sqlite, "array literals")),
        Custom::Values { .. } => Err(unsupported(Dialect::Sqlite, "values tables")),
    }
}

fn mysql(out: &mut Emitter<'_>, custom: &Custom) -> Result<(), SqlFxError> {
    match custom {
        Custom::Json(doc) => {
            out.bind(Primitive::Json(doc.clone()));
            Ok(())
        }
        Custom::Array(_) => Err(unsupported(Dialect::Mysql, "array literals")),
        Custom::Values { .. } => Err(unsupported(Dialect::Mysql, "values tables")),
    }
}

fn mssql(out: &mut Emitter<'_>, custom: &Custom) -> Result<(), SqlFxError> {
    match custom {
        Custom::Json(doc) => {
            out.bind(Primitive::Text(doc.to_string()));
            Ok(())
        }
        Custom::Array(_) => Err(unsupported(Dialect::Mssql, "array literals")),
        Custom::Values { rows, alias } => values_table(out, rows, alias),
    }
}

/// `(values (..), (..)) AS alias(cols)`
fn values_table(out: &mut Emitter<'_>, rows: &[Record], alias: &str) -> Result<(), SqlFxError> {
    let columns = shared_columns(rows, "values table")?;
    out.push_str("(values ");
    for (i, record) in rows.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.record_row(record, &columns);
    }
    out.push_str(") AS ");
    out.identifier(alias);
    out.push_str("(");
    out.column_list(&columns);
    out.push_str(")");
    Ok(())
}

fn unsupported(dialect: Dialect, what: &str) -> SqlFxError {
    SqlFxError::Unimplemented(format!("{what} are not supported by {dialect}"))
}

#[cfg(test)]
mod tests {
    use crate::compiler::Compiler;
    use crate::error::SqlFxError;
    use crate::fragment::{Fragment, Record};
    use crate::types::{Dialect, Primitive};

    #[test]
    fn postgres_array_binds_each_element() -> Result<(), SqlFxError> {
        let compiled = Compiler::new(Dialect::Postgres).compile(&Fragment::array([1, 2]))?;
        assert_eq!(compiled.sql, "ARRAY [$1, $2]");
        Ok(())
    }

    #[test]
    fn postgres_values_table() -> Result<(), SqlFxError> {
        let rows = vec![
            Record::new().with("id", 1).with("name", "a"),
            Record::new().with("id", 2).with("name", "b"),
        ];
        let compiled = Compiler::new(Dialect::Postgres).compile(&Fragment::values(rows, "data"))?;
        assert_eq!(
            compiled.sql,
            r#"(values ($1, $2), ($3, $4)) AS "data"("id", "name")"#
        );
        Ok(())
    }

    #[test]
    fn sqlite_json_is_bound_as_text() -> Result<(), SqlFxError> {
        let compiled = Compiler::new(Dialect::Sqlite)
            .compile(&Fragment::json(serde_json::json!({"a": 1})))?;
        assert_eq!(compiled.sql, "?");
        assert_eq!(compiled.params, vec![Primitive::Text(r#"{"a":1}"#.into())]);
        Ok(())
    }

    #[test]
    fn sqlite_rejects_arrays() {
        let result = Compiler::new(Dialect::Sqlite).compile(&Fragment::array([1]));
        assert!(matches!(result, Err(SqlFxError::Unimplemented(_))));
    }

    #[test]
    fn mssql_values_table_uses_brackets() -> Result<(), SqlFxError> {
        let rows = vec![Record::new().with("id", 1)];
        let compiled = Compiler::new(Dialect::Mssql).compile(&Fragment::values(rows, "v"))?;
        assert_eq!(compiled.sql, "(values (@p1)) AS [v]([id])");
        Ok(())
    }
}
