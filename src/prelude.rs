//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::driver::Driver;
pub use crate::error::SqlDriverError;
pub use crate::insert::{InsertRequest, Rows, insert};
pub use crate::query::{Arg, Query};
pub use crate::results::QueryResult;
pub use crate::session::Session;
pub use crate::transaction::{Transaction, TransactionState};
pub use crate::types::{Row, RowValues};
pub use crate::{row, sql};

#[cfg(feature = "postgres")]
pub use crate::postgres::{PgConnection, PgPool};
