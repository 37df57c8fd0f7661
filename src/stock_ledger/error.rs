use crate::error::AppError;
use thiserror::Error;

/// Errors that can occur during stock ledger operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StockError {
    #[error("Stock item not found: {0}")]
    NotFound(String),

    /// The caller's expected version is stale; re-read and retry.
    #[error("Version conflict: expected {expected}, current {current}")]
    VersionConflict { expected: u64, current: u64 },

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    #[error("Invalid stock request: {0}")]
    Validation(String),

    /// The ledger actor or its store could not serve the request.
    #[error("Stock ledger unavailable: {0}")]
    Unavailable(String),
}

impl From<StockError> for AppError {
    fn from(e: StockError) -> Self {
        match e {
            StockError::NotFound(_) => AppError::NotFound(e.to_string()),
            StockError::VersionConflict { .. } => AppError::VersionConflict(e.to_string()),
            StockError::InsufficientStock { .. } => AppError::InsufficientStock(e.to_string()),
            StockError::Validation(_) => AppError::Validation(e.to_string()),
            StockError::Unavailable(_) => AppError::DependencyUnavailable(e.to_string()),
        }
    }
}
