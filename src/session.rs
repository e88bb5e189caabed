use async_trait::async_trait;

use crate::error::SqlDriverError;
use crate::insert::{InsertRequest, Rows, insert};
use crate::parameterize::escape_qualified_identifier;
use crate::query::Query;
use crate::results::QueryResult;

/// The query surface shared by the pool-level [`Driver`](crate::Driver) and every
/// [`Transaction`](crate::Transaction).
#[async_trait]
pub trait Session: Send {
    /// Parameterize `query`, run it and return its rows with metadata.
    ///
    /// # Errors
    /// Parameterization errors are returned before any I/O; connection errors
    /// are passed through unchanged.
    async fn query(&mut self, query: Query) -> Result<QueryResult, SqlDriverError>;

    /// Build an [`InsertRequest`] to bind into a query.
    ///
    /// # Errors
    /// See [`insert`](crate::insert()).
    fn insert<I, S>(
        &self,
        rows: impl Into<Rows>,
        columns: I,
    ) -> Result<InsertRequest, SqlDriverError>
    where
        Self: Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        insert(rows, columns)
    }

    /// Run `insert into <table> (...) values (...)`, discarding the result rows.
    ///
    /// # Errors
    /// Insert builder errors before any I/O, then whatever [`Session::query`] returns.
    async fn insert_into<R>(&mut self, table: &str, rows: R) -> Result<(), SqlDriverError>
    where
        R: Into<Rows> + Send,
    {
        let request = insert(rows, None::<&str>)?;
        let query = Query::new(format!("insert into {} ", escape_qualified_identifier(table)))
            .insert(request);
        self.query(query).await?;
        Ok(())
    }
}
