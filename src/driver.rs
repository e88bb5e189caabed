use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::error::SqlDriverError;
use crate::parameterize::parameterize;
use crate::pool::{ConnectionPool, PhysicalConnection};
use crate::query::Query;
use crate::results::QueryResult;
use crate::session::Session;
use crate::transaction::Transaction;

/// Entry point over a connection pool.
///
/// Cloning is cheap; clones share the pool. Plain queries check a connection
/// out for one statement. Transactions keep one connection for their whole
/// lifetime, so independent `begin_with` calls may run concurrently, each on
/// its own connection, up to the pool's bound.
pub struct Driver<P: ConnectionPool> {
    pool: Arc<P>,
}

impl<P: ConnectionPool> Clone for Driver<P> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<P: ConnectionPool + fmt::Debug> fmt::Debug for Driver<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").field("pool", &self.pool).finish()
    }
}

impl<P: ConnectionPool> Driver<P> {
    #[must_use]
    pub fn new(pool: P) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Check out a connection and issue `BEGIN`.
    ///
    /// The caller must `commit` or `rollback` the returned transaction. Dropping
    /// it while pending rolls it back in the background.
    ///
    /// # Errors
    /// Pool and connection errors unchanged.
    pub async fn begin(&self) -> Result<Transaction<'static, P::Connection>, SqlDriverError> {
        let conn = self.pool.checkout().await?;
        Transaction::start(conn).await
    }

    /// Run `callback` inside a new root transaction.
    ///
    /// On success the transaction is committed unless the callback already
    /// committed or rolled it back. On failure it is rolled back and the
    /// callback's error returned. A callback that finalized the transaction
    /// and then failed gets `InvalidTransition` instead, with its own error
    /// logged. The connection goes back to the pool exactly once on every path.
    ///
    /// ```rust,no_run
    /// # use sql_driver::{Driver, Session, SqlDriverError, sql};
    /// # use sql_driver::pool::ConnectionPool;
    /// # async fn demo<P: ConnectionPool>(driver: Driver<P>) -> Result<(), SqlDriverError> {
    /// let users = driver
    ///     .begin_with(|trx| {
    ///         Box::pin(async move {
    ///             trx.query(sql!("update users set active = {}", true)?).await?;
    ///             trx.query(sql!("select * from users")?).await
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = users;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Whatever the callback returns, or checkout / `BEGIN` / `COMMIT` /
    /// `ROLLBACK` errors converted into `E`.
    pub fn begin_with<'s, F, T, E>(&'s self, callback: F) -> BoxFuture<'s, Result<T, E>>
    where
        for<'t> F: FnOnce(&'t mut Transaction<'static, P::Connection>) -> BoxFuture<'t, Result<T, E>>
            + Send
            + 's,
        T: Send + 's,
        E: From<SqlDriverError> + fmt::Display + Send + 's,
    {
        Box::pin(async move {
            let mut trx = self.begin().await?;
            let outcome = callback(&mut trx).await;
            trx.settle_root(outcome).await
        })
    }

    /// Close the pool. Must not be called while transactions are in flight.
    pub fn disconnect(&self) {
        debug!("draining pool");
        self.pool.drain();
    }
}

#[async_trait]
impl<P: ConnectionPool> Session for Driver<P> {
    async fn query(&mut self, query: Query) -> Result<QueryResult, SqlDriverError> {
        let statement = parameterize(query)?;
        debug!(sql = %statement.text, params = statement.values.len(), "query");
        let mut conn = self.pool.checkout().await?;
        let result = conn.execute(&statement).await;
        conn.release();
        result
    }
}
