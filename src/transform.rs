//! Column-name transforms applied to identifiers on the way in and to result
//! columns on the way out.

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::results::ResultSet;
use crate::types::Primitive;

/// A shared name transform, e.g. [`to_camel`] or [`from_camel`].
pub type NameTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Optional transforms for outgoing identifiers and incoming column names.
#[derive(Clone, Default)]
pub struct NameTransforms {
    pub query: Option<NameTransform>,
    pub result: Option<NameTransform>,
}

impl std::fmt::Debug for NameTransforms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameTransforms")
            .field("query", &self.query.is_some())
            .field("result", &self.result.is_some())
            .finish()
    }
}

impl NameTransforms {
    /// camelCase in Rust, snake_case in the database.
    #[must_use]
    pub fn camel_case() -> Self {
        Self {
            query: Some(Arc::new(from_camel)),
            result: Some(Arc::new(to_camel)),
        }
    }

    /// PascalCase in Rust, snake_case in the database.
    #[must_use]
    pub fn pascal_case() -> Self {
        Self {
            query: Some(Arc::new(from_pascal)),
            result: Some(Arc::new(to_pascal)),
        }
    }

    /// kebab-case in Rust, snake_case in the database.
    #[must_use]
    pub fn kebab_case() -> Self {
        Self {
            query: Some(Arc::new(from_kebab)),
            result: Some(Arc::new(to_kebab)),
        }
    }
}

/// `user_id` -> `userId`
#[must_use]
pub fn to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for (i, ch) in name.chars().enumerate() {
        if ch == '_' && i > 0 {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// `user_id` -> `UserId`
#[must_use]
pub fn to_pascal(name: &str) -> String {
    let camel = to_camel(name);
    let mut chars = camel.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => camel,
    }
}

/// `user_id` -> `user-id`
#[must_use]
pub fn to_kebab(name: &str) -> String {
    name.replace('_', "-")
}

/// `userId` -> `user_id`
#[must_use]
pub fn from_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_uppercase() {
            out.push('_');
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// `UserId` -> `user_id`
#[must_use]
pub fn from_pascal(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => {
            let mut out: String = first.to_lowercase().collect();
            out.push_str(&from_camel(chars.as_str()));
            out
        }
        None => String::new(),
    }
}

/// `user-id` -> `user_id`
#[must_use]
pub fn from_kebab(name: &str) -> String {
    name.replace('-', "_")
}

/// Rename result columns and the keys of any JSON objects nested in values.
#[must_use]
pub fn transform_result_set(result: ResultSet, transform: &NameTransform) -> ResultSet {
    let mut renamed = result.rename_columns(|name| transform(name));
    for row in renamed.rows_mut() {
        for value in row.values_mut() {
            if let Primitive::Json(doc) = value {
                let taken = std::mem::take(doc);
                *doc = transform_json(taken, transform);
            }
        }
    }
    renamed
}

fn transform_json(value: JsonValue, transform: &NameTransform) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let renamed: Map<String, JsonValue> = map
                .into_iter()
                .map(|(k, v)| (transform(&k), transform_json(v, transform)))
                .collect();
            JsonValue::Object(renamed)
        }
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .map(|v| transform_json(v, transform))
                .collect(),
        ),
        other => other,
    }
}
