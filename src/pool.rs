//! The pieces of a connection pool the driver relies on.
//!
//! The production implementation lives in [`crate::postgres`]; tests use the
//! recording pool from `test_utils`.

use async_trait::async_trait;

use crate::error::SqlDriverError;
use crate::parameterize::Statement;
use crate::results::QueryResult;

/// One live session to the database server, checked out from a pool.
#[async_trait]
pub trait PhysicalConnection: Send + 'static {
    /// Run a parameterized statement and collect its rows and metadata.
    ///
    /// # Errors
    /// Returns the backend's error unchanged.
    async fn execute(&mut self, statement: &Statement) -> Result<QueryResult, SqlDriverError>;

    /// Run parameterless SQL such as `BEGIN` or `SAVEPOINT "trx1"`.
    ///
    /// # Errors
    /// Returns the backend's error unchanged.
    async fn batch_execute(&mut self, sql: &str) -> Result<(), SqlDriverError>;

    /// Hand the connection back to the pool it came from.
    fn release(self);
}

/// A bounded set of physical connections.
#[async_trait]
pub trait ConnectionPool: Send + Sync + 'static {
    type Connection: PhysicalConnection;

    /// Check a connection out, waiting while the pool is exhausted.
    ///
    /// # Errors
    /// Fails when the pool is closed or a new connection cannot be opened.
    async fn checkout(&self) -> Result<Self::Connection, SqlDriverError>;

    /// Close the pool; idle connections are dropped and later checkouts fail.
    fn drain(&self);
}
