//! The cooking worker: consumes `kitchen.orders`, cooks each order once, and
//! reports progress to the notification relay.
//!
//! Idempotency is claimed before any work starts (`SET NX` on
//! `order:{orderId}:state`). A failed cook clears the claim and hands the
//! error back to the broker, which retries with backoff and eventually
//! dead-letters.

mod cook;
mod error;
mod idempotency;
mod publisher;
pub mod routes;
mod worker;

pub use cook::{Kitchen, SimulatedKitchen};
pub use error::KitchenError;
pub use idempotency::{IdempotencyStore, ProcessingState};
pub use publisher::{BusPublisher, HttpStatusPublisher, StatusPublisher};
pub use worker::CookingWorker;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::OrderHandler;
    use crate::cache::MemoryCache;
    use crate::metrics::KitchenMetrics;
    use crate::model::{ItemId, OrderEnvelope, OrderId, OrderLine, OrderStatus, StatusEvent};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<OrderStatus>>);

    #[async_trait]
    impl StatusPublisher for Recorder {
        async fn publish(&self, event: &StatusEvent) -> Result<(), KitchenError> {
            self.0.lock().unwrap().push(event.status);
            Ok(())
        }
    }

    struct BrokenPublisher;

    #[async_trait]
    impl StatusPublisher for BrokenPublisher {
        async fn publish(&self, _event: &StatusEvent) -> Result<(), KitchenError> {
            Err(KitchenError::Notify("relay down".into()))
        }
    }

    #[derive(Default)]
    struct Burnt(AtomicU32);

    #[async_trait]
    impl Kitchen for Burnt {
        async fn cook(&self, _order: &OrderEnvelope) -> Result<Duration, KitchenError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(KitchenError::Cook("stove on fire".into()))
        }
    }

    fn envelope(n: u32) -> OrderEnvelope {
        OrderEnvelope {
            order_id: OrderId(n),
            student_id: "S1".into(),
            items: vec![OrderLine {
                item_id: ItemId(1),
                quantity: 1,
            }],
            enqueued_at: Utc::now(),
        }
    }

    fn store() -> IdempotencyStore {
        IdempotencyStore::new(Arc::new(MemoryCache::new()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_cook_cycle_notifies_in_order() {
        let recorder = Arc::new(Recorder::default());
        let worker = CookingWorker::new(
            store(),
            SimulatedKitchen::new(Duration::ZERO, Duration::from_millis(2)),
            recorder.clone(),
            Arc::new(KitchenMetrics::default()),
        );

        worker.handle(&envelope(1), 1).await.unwrap();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![OrderStatus::InKitchen, OrderStatus::Ready]
        );
        assert_eq!(worker.metrics().snapshot().processed, 1);
    }

    #[tokio::test]
    async fn test_failure_clears_claim_and_reports_failed() {
        let recorder = Arc::new(Recorder::default());
        let idempotency = store();
        let worker = CookingWorker::new(
            idempotency.clone(),
            Burnt::default(),
            recorder.clone(),
            Arc::new(KitchenMetrics::default()),
        );

        let err = worker.handle(&envelope(2), 1).await.unwrap_err();
        assert!(matches!(err, KitchenError::Cook(_)));
        assert_eq!(idempotency.state("order-2").await.unwrap(), None);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![OrderStatus::InKitchen, OrderStatus::Failed]
        );
        assert_eq!(worker.metrics().snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_order() {
        let worker = CookingWorker::new(
            store(),
            SimulatedKitchen::new(Duration::ZERO, Duration::ZERO),
            Arc::new(BrokenPublisher),
            Arc::new(KitchenMetrics::default()),
        );

        worker.handle(&envelope(3), 1).await.unwrap();
        assert_eq!(worker.metrics().snapshot().processed, 1);
    }
}
