use super::error::KitchenError;
use crate::cache::Cache;
use std::sync::Arc;
use std::time::Duration;

const PROCESSING: &str = "PROCESSING";
const DONE: &str = "DONE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Processing,
    Done,
}

/// Per-order processing marker, `order:{orderId}:state`.
///
/// Claiming is a single set-if-absent so two workers sharing the store can
/// never both start the same order.
#[derive(Clone)]
pub struct IdempotencyStore {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(order_id: &str) -> String {
        format!("order:{order_id}:state")
    }

    /// Mark the order PROCESSING. `false` means someone already has.
    pub async fn try_begin(&self, order_id: &str) -> Result<bool, KitchenError> {
        Ok(self
            .cache
            .set_nx_ex(&Self::key(order_id), PROCESSING, self.ttl)
            .await?)
    }

    pub async fn mark_done(&self, order_id: &str) -> Result<(), KitchenError> {
        Ok(self.cache.set_ex(&Self::key(order_id), DONE, self.ttl).await?)
    }

    /// Forget the marker so a retry can run the order again.
    pub async fn clear(&self, order_id: &str) -> Result<(), KitchenError> {
        Ok(self.cache.delete(&Self::key(order_id)).await?)
    }

    pub async fn state(&self, order_id: &str) -> Result<Option<ProcessingState>, KitchenError> {
        let state = self.cache.get(&Self::key(order_id)).await?;
        Ok(match state.as_deref() {
            Some(PROCESSING) => Some(ProcessingState::Processing),
            Some(DONE) => Some(ProcessingState::Done),
            _ => None,
        })
    }

    pub async fn is_healthy(&self) -> bool {
        self.cache.ping().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn test_claim_once_until_cleared() {
        let store = IdempotencyStore::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));

        assert!(store.try_begin("order-1").await.unwrap());
        assert!(!store.try_begin("order-1").await.unwrap());
        assert_eq!(
            store.state("order-1").await.unwrap(),
            Some(ProcessingState::Processing)
        );

        store.mark_done("order-1").await.unwrap();
        assert!(!store.try_begin("order-1").await.unwrap());
        assert_eq!(store.state("order-1").await.unwrap(), Some(ProcessingState::Done));

        store.clear("order-1").await.unwrap();
        assert_eq!(store.state("order-1").await.unwrap(), None);
        assert!(store.try_begin("order-1").await.unwrap());
    }
}
