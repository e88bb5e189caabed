use thiserror::Error;

#[cfg(feature = "postgres")]
use deadpool_postgres::PoolError;

use crate::transaction::TransactionState;

#[derive(Debug, Error)]
pub enum SqlDriverError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PoolError(#[from] PoolError),

    #[error("Transaction can't be {action} after being {state}.")]
    InvalidTransition {
        action: &'static str,
        state: TransactionState,
    },

    #[error("Insert requires at least one row")]
    EmptyInsert,

    #[error("Row {row} is missing column \"{column}\"")]
    MissingColumn { row: usize, column: String },

    #[error("Row {row} has column \"{column}\" which the first row does not")]
    UnexpectedColumn { row: usize, column: String },

    #[error("Query template has {placeholders} placeholders but {args} arguments")]
    TemplateMismatch { placeholders: usize, args: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl SqlDriverError {
    /// True when the error came from a local state check rather than the database.
    #[must_use]
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}
