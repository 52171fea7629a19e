//! Renders [`Fragment`] trees into dialect SQL plus an ordered parameter list.

mod dialect;

use std::fmt;
use std::fmt::Write as _;

use crate::error::SqlFxError;
use crate::fragment::{Fragment, FragmentList, Record, RecordHelper};
use crate::transform::NameTransform;
use crate::types::{Dialect, Primitive};

/// Final SQL text and its parameters; placeholder N binds `params[N - 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<Primitive>,
}

/// How bound parameters are written into the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...`
    Dollar,
    /// `?, ?, ...`
    Question,
    /// `?1, ?2, ...`
    QuestionNumbered,
    /// `@p1, @p2, ...`
    AtP,
}

impl PlaceholderStyle {
    fn write(self, out: &mut String, ordinal: usize) {
        // Writing to a String cannot fail.
        let _ = match self {
            PlaceholderStyle::Dollar => write!(out, "${ordinal}"),
            PlaceholderStyle::Question => out.write_char('?'),
            PlaceholderStyle::QuestionNumbered => write!(out, "?{ordinal}"),
            PlaceholderStyle::AtP => write!(out, "@p{ordinal}"),
        };
    }
}

/// Identifier quoting rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `"name"`
    DoubleQuote,
    /// `` `name` ``
    Backtick,
    /// `[name]`
    Bracket,
}

impl QuoteStyle {
    fn quote_part(self, part: &str, out: &mut String) {
        let (open, close) = match self {
            QuoteStyle::DoubleQuote => ('"', '"'),
            QuoteStyle::Backtick => ('`', '`'),
            QuoteStyle::Bracket => ('[', ']'),
        };
        out.push(open);
        for ch in part.chars() {
            if ch == close {
                out.push(close);
            }
            out.push(ch);
        }
        out.push(close);
    }
}

/// Dialect-configured compiler; cheap to clone and safe to share.
#[derive(Clone)]
pub struct Compiler {
    dialect: Dialect,
    placeholder: PlaceholderStyle,
    quote: QuoteStyle,
    transform: Option<NameTransform>,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("dialect", &self.dialect)
            .field("placeholder", &self.placeholder)
            .field("quote", &self.quote)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl Compiler {
    /// Compiler with the dialect's native placeholder and quoting rules.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        let (placeholder, quote) = match dialect {
            Dialect::Postgres => (PlaceholderStyle::Dollar, QuoteStyle::DoubleQuote),
            Dialect::Sqlite => (PlaceholderStyle::Question, QuoteStyle::DoubleQuote),
            Dialect::Mysql => (PlaceholderStyle::Question, QuoteStyle::Backtick),
            Dialect::Mssql => (PlaceholderStyle::AtP, QuoteStyle::Bracket),
        };
        Self {
            dialect,
            placeholder,
            quote,
            transform: None,
        }
    }

    #[must_use]
    pub fn with_placeholder_style(mut self, placeholder: PlaceholderStyle) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Apply `transform` to every identifier before it is quoted.
    #[must_use]
    pub fn with_transform(mut self, transform: NameTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        self.placeholder
    }

    /// Transform and quote `name`; dotted names are quoted per segment.
    #[must_use]
    pub fn quote_identifier(&self, name: &str) -> String {
        let name = match &self.transform {
            Some(transform) => transform(name),
            None => name.to_string(),
        };
        let mut out = String::with_capacity(name.len() + 2);
        for (i, part) in name.split('.').enumerate() {
            if i > 0 {
                out.push('.');
            }
            self.quote.quote_part(part, &mut out);
        }
        out
    }

    /// Render `fragment` into SQL text and its parameters.
    ///
    /// Parameters are numbered in a left-to-right depth-first walk, so the
    /// same tree always yields the same statement.
    ///
    /// # Errors
    /// Returns `SqlFxError::Compile` for malformed record helpers and
    /// `SqlFxError::Unimplemented` for custom kinds the dialect cannot express.
    pub fn compile(&self, fragment: &Fragment) -> Result<CompiledStatement, SqlFxError> {
        let mut emitter = Emitter::new(self);
        emitter.fragment(fragment)?;
        Ok(emitter.finish())
    }
}

/// Output buffer for one compilation; hands out placeholders in order.
pub(crate) struct Emitter<'a> {
    compiler: &'a Compiler,
    sql: String,
    params: Vec<Primitive>,
}

impl<'a> Emitter<'a> {
    fn new(compiler: &'a Compiler) -> Self {
        Self {
            compiler,
            sql: String::with_capacity(64),
            params: Vec::new(),
        }
    }

    fn finish(self) -> CompiledStatement {
        CompiledStatement {
            sql: self.sql,
            params: self.params,
        }
    }

    pub(crate) fn push_str(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Allocate the next placeholder for `value` and write it.
    pub(crate) fn bind(&mut self, value: Primitive) {
        self.params.push(value);
        self.compiler
            .placeholder
            .write(&mut self.sql, self.params.len());
    }

    pub(crate) fn identifier(&mut self, name: &str) {
        let quoted = self.compiler.quote_identifier(name);
        self.sql.push_str(&quoted);
    }

    pub(crate) fn dialect(&self) -> Dialect {
        self.compiler.dialect
    }

    fn fragment(&mut self, fragment: &Fragment) -> Result<(), SqlFxError> {
        match fragment {
            Fragment::Raw(text) => self.push_str(text),
            Fragment::Identifier(name) => self.identifier(name),
            Fragment::Parameter(value) => self.bind(value.clone()),
            Fragment::List(list) => self.list(list)?,
            Fragment::Records(RecordHelper::Insert(records)) => self.insert(records)?,
            Fragment::Records(RecordHelper::Update { record, omit }) => {
                self.update(record, omit)?;
            }
            Fragment::Custom(custom) => dialect::render_custom(self, custom)?,
            Fragment::Unsafe { sql, params } => {
                self.push_str(sql);
                self.params.extend(params.iter().cloned());
            }
        }
        Ok(())
    }

    fn list(&mut self, list: &FragmentList) -> Result<(), SqlFxError> {
        if list.parenthesized {
            self.push_str("(");
        }
        for (i, item) in list.items.iter().enumerate() {
            if i > 0 {
                self.push_str(&list.separator);
            }
            self.fragment(item)?;
        }
        if list.parenthesized {
            self.push_str(")");
        }
        Ok(())
    }

    /// `(p1, p2)` for one record, in `columns` order.
    pub(crate) fn record_row(&mut self, record: &Record, columns: &[&str]) {
        self.push_str("(");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                self.push_str(", ");
            }
            let value = record.get(column).cloned().unwrap_or(Primitive::Null);
            self.bind(value);
        }
        self.push_str(")");
    }

    pub(crate) fn column_list(&mut self, columns: &[&str]) {
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                self.push_str(", ");
            }
            self.identifier(column);
        }
    }

    fn insert(&mut self, records: &[Record]) -> Result<(), SqlFxError> {
        let columns = shared_columns(records, "insert")?;
        self.push_str("(");
        self.column_list(&columns);
        self.push_str(") VALUES ");
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                self.push_str(", ");
            }
            self.record_row(record, &columns);
        }
        Ok(())
    }

    fn update(&mut self, record: &Record, omit: &[String]) -> Result<(), SqlFxError> {
        let mut written = 0;
        for (column, value) in record.iter() {
            if omit.iter().any(|o| o == column) {
                continue;
            }
            if written > 0 {
                self.push_str(", ");
            }
            self.identifier(column);
            self.push_str(" = ");
            self.bind(value.clone());
            written += 1;
        }
        if written == 0 {
            return Err(SqlFxError::Compile(
                "update requires at least one column".into(),
            ));
        }
        Ok(())
    }
}

/// Column order of the first record, after checking every record has the
/// same key set.
pub(crate) fn shared_columns<'r>(
    records: &'r [Record],
    what: &str,
) -> Result<Vec<&'r str>, SqlFxError> {
    let Some(first) = records.first() else {
        return Err(SqlFxError::Compile(format!(
            "{what} requires at least one record"
        )));
    };
    let columns: Vec<&str> = first.keys().collect();
    if columns.is_empty() {
        return Err(SqlFxError::Compile(format!(
            "{what} requires at least one column"
        )));
    }
    for (row, record) in records.iter().enumerate().skip(1) {
        let same_shape =
            record.len() == columns.len() && columns.iter().all(|c| record.get(c).is_some());
        if !same_shape {
            return Err(SqlFxError::Compile(format!(
                "{what} record {row} has columns [{}], expected [{}]",
                record.keys().collect::<Vec<_>>().join(", "),
                columns.join(", ")
            )));
        }
    }
    Ok(columns)
}
