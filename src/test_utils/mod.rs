//! Test support.
//!
//! [`RecordingPool`] is an in-memory [`ConnectionPool`](crate::pool::ConnectionPool)
//! that records every statement it is handed, so transaction behaviour can be
//! asserted on the exact SQL sequence without a server. The embedded Postgres
//! launcher lives under [`postgres`] behind the `test-utils-postgres` feature.

pub mod mock;

pub use mock::{Recorded, RecordingConnection, RecordingPool};

/// Embedded `PostgreSQL` for integration tests
#[cfg(feature = "test-utils-postgres")]
pub mod postgres;
