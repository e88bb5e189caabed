use std::fmt;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool, PoolError};

use super::query::run_statement;
use crate::error::SqlDriverError;
use crate::parameterize::Statement;
use crate::pool::{ConnectionPool, PhysicalConnection};
use crate::results::QueryResult;

/// A `deadpool_postgres` pool behind the driver.
#[derive(Clone)]
pub struct PgPool {
    pool: Pool,
}

impl PgPool {
    /// Wrap an already-built pool.
    #[must_use]
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// The underlying pool, e.g. for `status()`.
    #[must_use]
    pub fn inner(&self) -> &Pool {
        &self.pool
    }
}

impl fmt::Debug for PgPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PgPool")
            .field("size", &status.size)
            .field("available", &status.available)
            .field("max_size", &status.max_size)
            .finish()
    }
}

#[async_trait]
impl ConnectionPool for PgPool {
    type Connection = PgConnection;

    async fn checkout(&self) -> Result<PgConnection, SqlDriverError> {
        match self.pool.get().await {
            Ok(client) => Ok(PgConnection { client }),
            Err(PoolError::Closed) => Err(SqlDriverError::ConnectionError(
                "pool has been closed".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn drain(&self) {
        self.pool.close();
    }
}

/// A pooled Postgres client. Dropping it also returns it to the pool.
pub struct PgConnection {
    client: Object,
}

impl fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

#[async_trait]
impl PhysicalConnection for PgConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<QueryResult, SqlDriverError> {
        run_statement(&self.client, statement).await
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), SqlDriverError> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    fn release(self) {
        drop(self.client);
    }
}
