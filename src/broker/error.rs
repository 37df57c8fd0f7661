use actor_framework::StoreError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// The connection dropped; declare the topology again to resume.
    #[error("Broker connection lost")]
    Disconnected,

    /// The broker task is gone.
    #[error("Broker closed")]
    Closed,

    #[error("Broker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Unknown delivery tag {0}")]
    UnknownDelivery(u64),

    #[error("Queue store error: {0}")]
    Store(#[from] StoreError),

    #[error("Could not encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Gave up reconnecting after {0} attempts")]
    ReconnectExhausted(u32),
}
