//! Composable query fragments.
//!
//! A [`Fragment`] tree is plain data: it holds no connection and can be
//! compiled any number of times, for any dialect.

mod builder;
pub mod helpers;
mod record;

pub use builder::FragmentBuilder;
pub use record::Record;

use serde_json::Value as JsonValue;

use crate::types::Primitive;

/// A node of the query-construction tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// SQL text copied verbatim.
    Raw(String),
    /// A column, table or schema name; quoted by the dialect.
    Identifier(String),
    /// A bound value; becomes the next placeholder.
    Parameter(Primitive),
    List(FragmentList),
    /// Object-keyed insert/update helpers.
    Records(RecordHelper),
    Custom(Custom),
    /// Pre-rendered SQL plus its parameters, spliced in without checks.
    ///
    /// Placeholders inside `sql` are not renumbered.
    Unsafe { sql: String, params: Vec<Primitive> },
}

/// Children rendered one after another with `separator` between them.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentList {
    pub separator: String,
    pub items: Vec<Fragment>,
    pub parenthesized: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordHelper {
    /// `(cols) VALUES (..), (..)`; every record must have the same keys.
    Insert(Vec<Record>),
    /// `col = value, ...` minus the omitted columns.
    Update { record: Record, omit: Vec<String> },
}

/// Dialect extension kinds. Each dialect matches on these exhaustively and
/// rejects the kinds it cannot express.
#[derive(Debug, Clone, PartialEq)]
pub enum Custom {
    /// Typed array literal.
    Array(Vec<Primitive>),
    /// A JSON document bound as one parameter.
    Json(JsonValue),
    /// Bulk values usable as a table: `(values (..), (..)) AS alias(cols)`.
    Values { rows: Vec<Record>, alias: String },
}

impl Fragment {
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Fragment::Raw(sql.into())
    }

    #[must_use]
    pub fn ident(name: impl Into<String>) -> Self {
        Fragment::Identifier(name.into())
    }

    #[must_use]
    pub fn param(value: impl Into<Primitive>) -> Self {
        Fragment::Parameter(value.into())
    }

    /// Join `items` with `separator`.
    #[must_use]
    pub fn list(separator: impl Into<String>, items: Vec<Fragment>) -> Self {
        Fragment::List(FragmentList {
            separator: separator.into(),
            items,
            parenthesized: false,
        })
    }

    /// Render `items` back to back with no separator.
    #[must_use]
    pub fn concat(items: Vec<Fragment>) -> Self {
        Self::list("", items)
    }

    /// `(p1, p2, ...)` for use after `IN`; an empty input renders `(NULL)`
    /// so the predicate matches nothing.
    #[must_use]
    pub fn in_list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Primitive>,
    {
        let items: Vec<Fragment> = values.into_iter().map(Fragment::param).collect();
        if items.is_empty() {
            return Fragment::raw("(NULL)");
        }
        Fragment::List(FragmentList {
            separator: ", ".into(),
            items,
            parenthesized: true,
        })
    }

    #[must_use]
    pub fn insert(records: Vec<Record>) -> Self {
        Fragment::Records(RecordHelper::Insert(records))
    }

    #[must_use]
    pub fn insert_one(record: Record) -> Self {
        Self::insert(vec![record])
    }

    #[must_use]
    pub fn update(record: Record, omit: &[&str]) -> Self {
        Fragment::Records(RecordHelper::Update {
            record,
            omit: omit.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    #[must_use]
    pub fn array<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Primitive>,
    {
        Fragment::Custom(Custom::Array(values.into_iter().map(Into::into).collect()))
    }

    #[must_use]
    pub fn json(value: JsonValue) -> Self {
        Fragment::Custom(Custom::Json(value))
    }

    #[must_use]
    pub fn values(rows: Vec<Record>, alias: impl Into<String>) -> Self {
        Fragment::Custom(Custom::Values {
            rows,
            alias: alias.into(),
        })
    }

    /// Inject `sql` and `params` verbatim, bypassing the compiler.
    ///
    /// The caller is responsible for placeholder syntax and for the safety of
    /// `sql`; nothing is escaped.
    #[must_use]
    pub fn unsafe_sql(sql: impl Into<String>, params: Vec<Primitive>) -> Self {
        Fragment::Unsafe {
            sql: sql.into(),
            params,
        }
    }

    /// True for fragments that render no SQL at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Fragment::Raw(s) => s.trim().is_empty(),
            Fragment::List(list) => list.items.iter().all(Fragment::is_empty) && !list.parenthesized,
            _ => false,
        }
    }
}

impl From<&str> for Fragment {
    fn from(sql: &str) -> Self {
        Fragment::Raw(sql.to_string())
    }
}

impl From<String> for Fragment {
    fn from(sql: String) -> Self {
        Fragment::Raw(sql)
    }
}

impl From<Record> for Fragment {
    fn from(record: Record) -> Self {
        Fragment::insert_one(record)
    }
}

impl From<FragmentBuilder> for Fragment {
    fn from(builder: FragmentBuilder) -> Self {
        builder.build()
    }
}
