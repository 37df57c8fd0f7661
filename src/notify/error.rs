use crate::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Notification relay is shut down")]
    Closed,

    #[error("Invalid notification: {0}")]
    Validation(String),
}

impl From<RelayError> for AppError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Validation(msg) => AppError::Validation(msg),
            RelayError::Closed => AppError::DependencyUnavailable("notification relay is shut down".into()),
        }
    }
}
