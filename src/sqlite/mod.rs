// SQLite backend built on rusqlite.
//
// - config: options and `Client::sqlite`
// - worker: one OS thread per connection owning the rusqlite handle
// - params: `Primitive` to rusqlite values
// - query: rows back into `Primitive` values

pub mod config;
pub mod params;
pub mod query;
pub mod worker;

pub use config::{SqliteOptions, SqliteOptionsBuilder};
pub use worker::{SqliteConnection, SqliteDriver};
