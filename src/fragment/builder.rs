use super::Fragment;
use crate::types::Primitive;

/// Fluent stand-in for tagged-template statements.
///
/// Text goes in through [`sql`](Self::sql); every value goes in through
/// [`bind`](Self::bind) and always becomes a parameter, never inline text.
///
/// ```rust
/// use sqlfx::prelude::*;
///
/// let query = FragmentBuilder::new()
///     .sql("SELECT * FROM ")
///     .ident("people")
///     .sql(" WHERE id = ")
///     .bind(7)
///     .build();
/// let compiled = Compiler::new(Dialect::Postgres).compile(&query).unwrap();
/// assert_eq!(compiled.sql, r#"SELECT * FROM "people" WHERE id = $1"#);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FragmentBuilder {
    parts: Vec<Fragment>,
}

impl FragmentBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sql(mut self, text: impl Into<String>) -> Self {
        self.parts.push(Fragment::Raw(text.into()));
        self
    }

    #[must_use]
    pub fn ident(mut self, name: impl Into<String>) -> Self {
        self.parts.push(Fragment::Identifier(name.into()));
        self
    }

    #[must_use]
    pub fn bind(mut self, value: impl Into<Primitive>) -> Self {
        self.parts.push(Fragment::Parameter(value.into()));
        self
    }

    /// Embed another fragment (sub-query, helper output, ...) at this point.
    #[must_use]
    pub fn push(mut self, fragment: impl Into<Fragment>) -> Self {
        self.parts.push(fragment.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Fragment {
        match self.parts.len() {
            1 => self.parts.into_iter().next().unwrap_or_else(|| Fragment::raw("")),
            _ => Fragment::concat(self.parts),
        }
    }
}
