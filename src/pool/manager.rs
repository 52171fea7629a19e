use std::future::Future;

use bb8::ManageConnection;

use super::{Driver, DriverConnection};
use crate::error::SqlFxError;

/// A driver connection plus the flags the pool uses to decide reuse.
pub struct Managed<C> {
    pub(crate) conn: C,
    /// A statement started and never finished (its future was dropped).
    pub(crate) in_flight: bool,
    /// Explicitly marked unusable, e.g. after a failed rollback.
    pub(crate) broken: bool,
}

/// bb8 manager adapting any [`Driver`].
pub struct DriverManager<D> {
    driver: D,
}

impl<D: Driver> DriverManager<D> {
    #[must_use]
    pub fn new(driver: D) -> Self {
        Self { driver }
    }
}

impl<D: Driver> ManageConnection for DriverManager<D> {
    type Connection = Managed<D::Conn>;
    type Error = SqlFxError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let connecting = self.driver.connect();
        async move {
            let conn = connecting.await?;
            tracing::debug!("opened pooled connection");
            Ok(Managed {
                conn,
                in_flight: false,
                broken: false,
            })
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.conn.ping().await }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.in_flight || conn.broken || conn.conn.is_closed()
    }
}
