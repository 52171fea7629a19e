use rusqlite::types::Value;

use crate::types::Primitive;

/// Text layout used for timestamps; sorts and compares correctly as text.
pub const TIMESTAMP_FORMAT: &str = "%F %T%.f";

/// Convert one `Primitive` to the value rusqlite binds.
///
/// SQLite has no boolean, timestamp or JSON storage class: booleans become
/// integers, timestamps and JSON become text.
#[must_use]
pub fn to_sqlite_value(value: &Primitive) -> Value {
    match value {
        Primitive::Null => Value::Null,
        Primitive::Bool(b) => Value::Integer(i64::from(*b)),
        Primitive::Int(i) => Value::Integer(*i),
        Primitive::Float(f) => Value::Real(*f),
        Primitive::Text(s) => Value::Text(s.clone()),
        Primitive::Bytes(b) => Value::Blob(b.clone()),
        Primitive::Timestamp(dt) => Value::Text(dt.format(TIMESTAMP_FORMAT).to_string()),
        Primitive::Json(json) => Value::Text(json.to_string()),
    }
}

#[must_use]
pub fn to_sqlite_values(params: &[Primitive]) -> Vec<Value> {
    params.iter().map(to_sqlite_value).collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;

    #[test]
    fn bools_and_json_use_sqlite_storage_classes() {
        assert_eq!(to_sqlite_value(&Primitive::Bool(true)), Value::Integer(1));
        assert_eq!(
            to_sqlite_value(&Primitive::Json(json!({"a": 1}))),
            Value::Text(r#"{"a":1}"#.to_string())
        );
    }

    #[test]
    fn timestamps_render_as_sortable_text() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_milli_opt(7, 5, 1, 250));
        let Some(dt) = dt else {
            panic!("valid date");
        };
        assert_eq!(
            to_sqlite_value(&Primitive::Timestamp(dt)),
            Value::Text("2024-03-09 07:05:01.250".to_string())
        );
    }
}
