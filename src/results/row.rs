use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::Primitive;

/// A single row of a result set.
///
/// Column names and the name-to-index lookup are shared by every row of the
/// same result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Primitive>,
    index: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Build a standalone row, computing its own column index.
    #[must_use]
    pub fn new(columns: Arc<Vec<String>>, values: Vec<Primitive>) -> Self {
        let index = Arc::new(column_index(&columns));
        Self {
            columns,
            values,
            index,
        }
    }

    pub(crate) fn with_index(
        columns: Arc<Vec<String>>,
        index: Arc<HashMap<String, usize>>,
        values: Vec<Primitive>,
    ) -> Self {
        Self {
            columns,
            values,
            index,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[Primitive] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Primitive> {
        self.values
    }

    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    /// Value of the named column, or `None` when the row has no such column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Primitive> {
        self.column_index(column).and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Primitive> {
        self.values.get(index)
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Primitive] {
        &mut self.values
    }
}

pub(crate) fn column_index(columns: &[String]) -> HashMap<String, usize> {
    // First occurrence wins for duplicated column names.
    let mut index = HashMap::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        index.entry(name.clone()).or_insert(i);
    }
    index
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
