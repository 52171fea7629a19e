// PostgreSQL backend built on tokio-postgres.
//
// - config: connection options and `Client::postgres`
// - driver: pooled session implementation
// - params: binding `Primitive` values to server types
// - query: turning rows back into `Primitive` values

pub mod config;
pub mod driver;
pub mod params;
pub mod query;

pub use config::{PgOptions, PgOptionsBuilder};
pub use driver::{PgConnection, PgDriver};
