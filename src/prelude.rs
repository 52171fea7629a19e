//! Common imports: `use sqlfx::prelude::*;`

pub use crate::client::{Client, ClientBuilder, Statement};
pub use crate::compiler::{CompiledStatement, Compiler, PlaceholderStyle};
pub use crate::error::SqlFxError;
pub use crate::fragment::helpers::{and, csv, or};
pub use crate::fragment::{Fragment, FragmentBuilder, Record};
pub use crate::migrator::{Migration, Migrator};
pub use crate::pool::PoolConfig;
pub use crate::resolver::{RequestCache, Resolver};
pub use crate::results::{ResultSet, Row};
pub use crate::transform::NameTransforms;
pub use crate::types::{Dialect, Primitive};

#[cfg(feature = "postgres")]
pub use crate::postgres::{PgOptions, PgOptionsBuilder};
#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteOptions, SqliteOptionsBuilder};
