use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// A scalar that can be bound as a statement parameter or read back from a row.
///
/// ```rust
/// use sqlfx::prelude::*;
///
/// let params: Vec<Primitive> = vec![1_i64.into(), "alice".into(), true.into()];
/// assert_eq!(params[1].as_text(), Some("alice"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Null,
    Bool(bool),
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
    /// JSON document; bound natively where the dialect supports it, as text otherwise
    Json(JsonValue),
}

impl Primitive {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let Primitive::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Primitive::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            Primitive::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Primitive::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// SQLite has no boolean storage class, so `0`/`1` integers are accepted too.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Primitive::Bool(value) => Some(*value),
            Primitive::Int(1) => Some(true),
            Primitive::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Primitive::Bytes(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Primitive::Timestamp(value) => Some(*value),
            Primitive::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                .ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let Primitive::Json(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Map a JSON value onto the closest primitive.
    ///
    /// Scalars become scalars; objects and arrays stay JSON documents.
    #[must_use]
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Primitive::Null,
            JsonValue::Bool(b) => Primitive::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Primitive::Int(i),
                None => Primitive::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Primitive::Text(s),
            other => Primitive::Json(other),
        }
    }

    /// JSON rendering used when rows are handed to serde for decoding.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Primitive::Null => JsonValue::Null,
            Primitive::Bool(b) => JsonValue::Bool(*b),
            Primitive::Int(i) => JsonValue::from(*i),
            Primitive::Float(f) => JsonValue::from(*f),
            Primitive::Text(s) => JsonValue::String(s.clone()),
            Primitive::Bytes(b) => JsonValue::from(b.clone()),
            Primitive::Timestamp(ts) => JsonValue::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Primitive::Json(v) => v.clone(),
        }
    }
}

impl Serialize for Primitive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Primitive::Null => serializer.serialize_none(),
            Primitive::Bool(b) => serializer.serialize_bool(*b),
            Primitive::Int(i) => serializer.serialize_i64(*i),
            Primitive::Float(f) => serializer.serialize_f64(*f),
            Primitive::Text(s) => serializer.serialize_str(s),
            Primitive::Bytes(b) => serializer.collect_seq(b),
            Primitive::Timestamp(ts) => ts.serialize(serializer),
            Primitive::Json(v) => v.serialize(serializer),
        }
    }
}

macro_rules! primitive_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Primitive {
                fn from(value: $ty) -> Self {
                    Primitive::$variant(value.into())
                }
            }
        )*
    };
}

primitive_from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
    NaiveDateTime => Timestamp,
    JsonValue => Json,
}

impl<T: Into<Primitive>> From<Option<T>> for Primitive {
    fn from(value: Option<T>) -> Self {
        value.map_or(Primitive::Null, Into::into)
    }
}

/// SQL dialects the compiler knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `PostgreSQL`
    Postgres,
    /// `SQLite`
    Sqlite,
    /// `MySQL` / `MariaDB`
    Mysql,
    /// SQL Server
    Mssql,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
            Dialect::Mssql => "mssql",
        };
        f.write_str(name)
    }
}
