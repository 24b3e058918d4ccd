//! State store errors.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Storage failures, plus records that no longer decode.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open state database: {0}")]
    Open(String),

    #[error("state transaction failed: {0}")]
    Transaction(String),

    #[error("cannot open table: {0}")]
    Table(String),

    #[error("storage read failed: {0}")]
    Read(String),

    #[error("storage write failed: {0}")]
    Write(String),

    #[error("cannot encode record: {0}")]
    Encode(String),

    /// A stored value failed to decode into its domain type.
    #[error("corrupt record {key:?} in table {table}: {reason}")]
    Corrupt {
        table: String,
        key: String,
        reason: String,
    },
}
