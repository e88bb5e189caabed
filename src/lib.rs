//! Parameterized queries, bulk inserts and savepoint-based nested
//! transactions over a pooled `PostgreSQL` connection.
//!
//! Queries are built from SQL fragments and bound values ([`Query`], [`sql!`]),
//! turned into `$n`-placeholder statements by [`parameterize`], and run through
//! the [`Session`] trait on either a [`Driver`] (one pooled connection per
//! statement) or a [`Transaction`].
//!
//! ```rust,no_run
//! use sql_driver::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlDriverError> {
//! let driver = Driver::new(PgPool::from_env(None)?);
//! driver
//!     .begin_with(|trx| {
//!         Box::pin(async move {
//!             let users = trx.insert(vec![row! { "username" => "foo" }], ["username"])?;
//!             trx.query(Query::new("insert into users ").insert(users)).await?;
//!             Ok::<_, SqlDriverError>(())
//!         })
//!     })
//!     .await?;
//! driver.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod error;
pub mod insert;
pub mod parameterize;
pub mod pool;
pub mod prelude;
pub mod query;
pub mod results;
pub mod session;
pub mod transaction;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use driver::Driver;
pub use error::SqlDriverError;
pub use insert::{InsertRequest, Rows, insert};
pub use parameterize::{
    MAX_BIND_PARAMS, Statement, escape_identifier, escape_qualified_identifier, parameterize,
};
pub use query::{Arg, Query};
pub use results::QueryResult;
pub use session::Session;
pub use transaction::{SavepointId, Transaction, TransactionState};
pub use types::{Row, RowValues};

#[cfg(feature = "postgres")]
pub use postgres::{PgConnection, PgPool};
