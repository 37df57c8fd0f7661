use crate::error::AppError;
use crate::model::OrderStatus;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Illegal transition {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Invalid order: {0}")]
    Validation(String),

    #[error("Order store unavailable: {0}")]
    Unavailable(String),
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NotFound(_) => AppError::NotFound(e.to_string()),
            OrderError::InvalidTransition { .. } => AppError::Internal(e.to_string()),
            OrderError::Validation(_) => AppError::Validation(e.to_string()),
            OrderError::Unavailable(_) => AppError::DependencyUnavailable(e.to_string()),
        }
    }
}
