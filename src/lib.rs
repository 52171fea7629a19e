//! Dialect-agnostic SQL client.
//!
//! Statements are built as [`Fragment`] trees and compiled per dialect into
//! SQL text plus positional parameters. A [`Client`] runs them on pooled
//! connections, nests transactions as savepoints, and batches concurrent
//! lookups through [`Resolver`]s.
//!
//! ```rust,no_run
//! use sqlfx::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlFxError> {
//! let client = Client::sqlite_builder("app.db").build().await?;
//! let ids = vec![Primitive::Int(1), Primitive::Int(2)];
//! let people = client
//!     .statement(
//!         FragmentBuilder::new()
//!             .sql("SELECT id, name FROM people WHERE id IN ")
//!             .push(Fragment::in_list(ids))
//!             .build(),
//!     )
//!     .await?;
//! assert!(people.len() <= 2);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod compiler;
pub mod connection;
pub mod error;
pub mod fragment;
pub mod migrator;
pub mod pool;
pub mod prelude;
pub mod resolver;
pub mod results;
pub mod schema;
pub mod transaction;
pub mod transform;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{Client, ClientBuilder, Statement};
pub use compiler::{CompiledStatement, Compiler, PlaceholderStyle, QuoteStyle};
pub use connection::{Acquire, BoxedConnection, Connection, SharedConnection};
pub use error::{MigrationErrorReason, SchemaDirection, SqlFxError};
pub use fragment::{Fragment, FragmentBuilder, Record};
pub use migrator::{Migration, MigrationSource, Migrator};
pub use pool::{Driver, DriverConnection, Pool, PoolConfig};
pub use resolver::{RequestCache, Resolver};
pub use results::{ResultSet, Row};
pub use transaction::{TransactionContext, TransactionSql};
pub use transform::{NameTransform, NameTransforms};
pub use types::{Dialect, Primitive};
