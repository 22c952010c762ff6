//! Error types for Sift

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Empty batch: at least one transaction is required")]
    EmptyBatch,

    #[error("Row count mismatch: expected {expected} rows, got {actual}")]
    RowCountMismatch { expected: usize, actual: usize },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Signal error: {0}")]
    Signal(String),

    #[error("Batch cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
