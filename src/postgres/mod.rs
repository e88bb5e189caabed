// PostgreSQL backend for the driver.
//
// - config: pool construction and configuration validation
// - connection: the pool and physical connection behind `Driver<PgPool>`
// - params: binding `RowValues` as Postgres parameters
// - query: running statements and turning rows back into `Row`s

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use connection::{PgConnection, PgPool};
pub use query::{build_row, postgres_extract_value, run_statement};
