use crate::cache::CacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KitchenError {
    #[error("Idempotency store unavailable: {0}")]
    Idempotency(#[from] CacheError),

    #[error("Cooking failed: {0}")]
    Cook(String),

    #[error("Status notification failed: {0}")]
    Notify(String),
}

impl From<reqwest::Error> for KitchenError {
    fn from(e: reqwest::Error) -> Self {
        KitchenError::Notify(e.to_string())
    }
}
