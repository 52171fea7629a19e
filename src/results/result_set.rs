use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::row::{Row, column_index};
use crate::types::Primitive;

/// Rows returned by one statement plus its affected-row count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultSet {
    rows: Vec<Row>,
    #[serde(skip)]
    rows_affected: usize,
    #[serde(skip)]
    columns: Arc<Vec<String>>,
    #[serde(skip)]
    index: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    /// Start an empty result set for the given columns.
    #[must_use]
    pub fn with_columns(columns: Vec<String>, capacity: usize) -> Self {
        let index = Arc::new(column_index(&columns));
        Self {
            rows: Vec::with_capacity(capacity),
            rows_affected: 0,
            columns: Arc::new(columns),
            index,
        }
    }

    /// Result of a statement that produced no rows.
    #[must_use]
    pub fn affected(rows_affected: usize) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    /// Append a row whose values follow the column order of this set.
    pub fn push_values(&mut self, values: Vec<Primitive>) {
        self.rows.push(Row::with_index(
            Arc::clone(&self.columns),
            Arc::clone(&self.index),
            values,
        ));
        self.rows_affected += 1;
    }

    pub fn set_rows_affected(&mut self, rows_affected: usize) {
        self.rows_affected = rows_affected;
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Positional view: each row as a plain value vector.
    #[must_use]
    pub fn into_values(self) -> Vec<Vec<Primitive>> {
        self.rows.into_iter().map(Row::into_values).collect()
    }

    #[must_use]
    pub fn rows_affected(&self) -> usize {
        self.rows_affected
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rename every column with `rename`, keeping values in place.
    #[must_use]
    pub fn rename_columns(self, rename: impl Fn(&str) -> String) -> Self {
        let columns: Vec<String> = self.columns.iter().map(|c| rename(c)).collect();
        let mut renamed = Self::with_columns(columns, self.rows.len());
        for row in self.rows {
            renamed.push_values(row.into_values());
        }
        renamed.rows_affected = self.rows_affected;
        renamed
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_share_column_lookup() {
        let mut rs = ResultSet::with_columns(vec!["id".into(), "name".into()], 2);
        rs.push_values(vec![Primitive::Int(1), Primitive::Text("a".into())]);
        rs.push_values(vec![Primitive::Int(2), Primitive::Null]);

        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows()[1].get("id"), Some(&Primitive::Int(2)));
        assert_eq!(rs.rows()[0].get("missing"), None);
    }

    #[test]
    fn rows_serialize_as_maps() {
        let mut rs = ResultSet::with_columns(vec!["id".into(), "tags".into()], 1);
        rs.push_values(vec![
            Primitive::Int(7),
            Primitive::Json(serde_json::json!(["x"])),
        ]);
        let json = serde_json::to_value(&rs).unwrap_or_default();
        assert_eq!(json, serde_json::json!([{"id": 7, "tags": ["x"]}]));
    }

    #[test]
    fn rename_keeps_affected_count() {
        let mut rs = ResultSet::with_columns(vec!["user_id".into()], 1);
        rs.push_values(vec![Primitive::Int(1)]);
        rs.set_rows_affected(5);
        let renamed = rs.rename_columns(|c| c.to_uppercase());
        assert_eq!(renamed.columns(), ["USER_ID".to_string()]);
        assert_eq!(renamed.rows_affected(), 5);
    }
}
