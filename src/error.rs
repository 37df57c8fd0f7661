//! HTTP-facing error type shared by every service router.
//!
//! Component errors (`StockError`, `OrderError`, ...) convert into [`AppError`],
//! which renders as `{ "code": "...", "message": "..." }` with the matching status.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    VersionConflict(String),
    #[error("{0}")]
    InsufficientStock(String),
    /// Early rejection from the gateway's cached stock count.
    #[error("{0}")]
    CacheRejected(String),
    #[error("{0}")]
    DependencyUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

/// Wire shape of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::CacheRejected(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::VersionConflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Auth(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::VersionConflict(_) => "version_conflict",
            AppError::InsufficientStock(_) => "insufficient_stock",
            AppError::CacheRejected(_) => "insufficient_stock_cached",
            AppError::DependencyUnavailable(_) => "dependency_unavailable",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Internal(msg) => tracing::error!(error = %msg, "Internal error"),
            AppError::DependencyUnavailable(msg) => tracing::warn!(error = %msg, "Dependency unavailable"),
            _ => tracing::debug!(code = self.code(), error = %self, "Request rejected"),
        }

        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_are_distinguishable() {
        let conflict = AppError::VersionConflict("stale".into());
        let short = AppError::InsufficientStock("2 left".into());
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "version_conflict");
        assert_eq!(short.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(short.code(), "insufficient_stock");
        assert_eq!(AppError::CacheRejected("x".into()).status(), StatusCode::BAD_REQUEST);
    }
}
