use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{SchemaDirection, SqlFxError};
use crate::types::Primitive;

/// An ordered column -> value map; insertion order is column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Primitive)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chainable form of [`Record::set`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Primitive>) -> Self {
        self.set(column, value);
        self
    }

    /// Set a column, replacing an existing value in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Primitive>) {
        let column = column.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == column) {
            slot.1 = value;
        } else {
            self.entries.push((column, value));
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Primitive> {
        self.entries.iter().find(|(k, _)| k == column).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Primitive)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a record from any serializable struct or map.
    ///
    /// Columns come out sorted by name. Nested objects and arrays are kept as
    /// JSON values.
    ///
    /// # Errors
    /// Returns `SqlFxError::Schema` when `value` does not serialize to an object.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, SqlFxError> {
        let json = serde_json::to_value(value)
            .map_err(|e| SqlFxError::schema(SchemaDirection::Request, e))?;
        match json {
            JsonValue::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, Primitive::from_json(v)))
                .collect()),
            other => Err(SqlFxError::schema(
                SchemaDirection::Request,
                format!("expected an object, got {other}"),
            )),
        }
    }
}

impl<K: Into<String>, V: Into<Primitive>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_without_reordering() {
        let mut record = Record::new().with("a", 1).with("b", 2);
        record.set("a", 3);
        assert_eq!(record.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(record.get("a"), Some(&Primitive::Int(3)));
    }

    #[test]
    fn scalars_are_rejected_by_from_serialize() {
        let err = Record::from_serialize(&5).err();
        assert!(matches!(err, Some(SqlFxError::Schema { .. })));
    }
}
