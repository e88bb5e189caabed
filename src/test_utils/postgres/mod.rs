use std::sync::LazyLock;
use tokio::runtime::Runtime;

/// Shared tokio runtime for test utilities to avoid creating multiple runtimes
pub(crate) static SHARED_RUNTIME: LazyLock<Runtime> =
    LazyLock::new(|| Runtime::new().expect("Failed to create tokio runtime for test utilities"));

/// `PostgreSQL` embedded database functionality
pub mod embedded;

pub use embedded::{EmbeddedPostgres, setup_postgres_embedded, stop_postgres_embedded};
