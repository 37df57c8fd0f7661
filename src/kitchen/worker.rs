use super::cook::Kitchen;
use super::error::KitchenError;
use super::idempotency::IdempotencyStore;
use super::publisher::StatusPublisher;
use crate::broker::OrderHandler;
use crate::clients::OrderClient;
use crate::metrics::KitchenMetrics;
use crate::model::{OrderEnvelope, OrderStatus, StatusEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Runs one order through the kitchen:
/// claim → IN_KITCHEN → cook → DONE → READY.
///
/// A redelivered order whose marker is already PROCESSING or DONE is acked
/// without cooking. That includes an order whose worker died mid-cook: it
/// stays PROCESSING and never reaches READY.
pub struct CookingWorker<K> {
    idempotency: IdempotencyStore,
    kitchen: K,
    publisher: Arc<dyn StatusPublisher>,
    orders: Option<OrderClient>,
    notify_timeout: Duration,
    metrics: Arc<KitchenMetrics>,
}

impl<K: Kitchen> CookingWorker<K> {
    pub fn new(
        idempotency: IdempotencyStore,
        kitchen: K,
        publisher: Arc<dyn StatusPublisher>,
        metrics: Arc<KitchenMetrics>,
    ) -> Self {
        Self {
            idempotency,
            kitchen,
            publisher,
            orders: None,
            notify_timeout: Duration::from_secs(3),
            metrics,
        }
    }

    /// Keep the order record in step with the cook cycle.
    pub fn with_orders(mut self, orders: OrderClient) -> Self {
        self.orders = Some(orders);
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &Arc<KitchenMetrics> {
        &self.metrics
    }

    async fn cook_cycle(&self, order: &OrderEnvelope, order_id: &str) -> Result<(), KitchenError> {
        self.record(order, OrderStatus::InKitchen, None).await;
        self.notify(order, OrderStatus::InKitchen, None).await;

        let prep = self.kitchen.cook(order).await?;
        self.idempotency.mark_done(order_id).await?;

        self.record(order, OrderStatus::Ready, None).await;
        self.notify(order, OrderStatus::Ready, None).await;
        info!(order_id = %order_id, ?prep, "Order ready");
        Ok(())
    }

    /// Best effort; a lost notification never fails the order.
    async fn notify(&self, order: &OrderEnvelope, status: OrderStatus, detail: Option<String>) {
        let event = StatusEvent::now(
            order.order_id.to_string(),
            order.student_id.clone(),
            status,
            detail,
        );
        match tokio::time::timeout(self.notify_timeout, self.publisher.publish(&event)).await {
            Ok(Ok(())) => debug!(order_id = %order.order_id, %status, "Notified"),
            Ok(Err(e)) => warn!(order_id = %order.order_id, %status, error = %e, "Notification failed"),
            Err(_) => warn!(order_id = %order.order_id, %status, "Notification timed out"),
        }
    }

    async fn record(&self, order: &OrderEnvelope, status: OrderStatus, detail: Option<String>) {
        let Some(orders) = &self.orders else {
            return;
        };
        if let Err(e) = orders.advance(order.order_id, status, detail).await {
            warn!(order_id = %order.order_id, %status, error = %e, "Order record not updated");
        }
    }
}

#[async_trait]
impl<K: Kitchen> OrderHandler for CookingWorker<K> {
    type Error = KitchenError;

    async fn handle(&self, order: &OrderEnvelope, attempt: u32) -> Result<(), KitchenError> {
        let order_id = order.order_id.to_string();

        if !self.idempotency.try_begin(&order_id).await? {
            let state = self.idempotency.state(&order_id).await.ok().flatten();
            info!(order_id = %order_id, attempt, ?state, "Already handled, skipping");
            self.metrics.skipped();
            return Ok(());
        }

        let started = Instant::now();
        match self.cook_cycle(order, &order_id).await {
            Ok(()) => {
                self.metrics.cooked(started.elapsed().as_millis() as u64);
                Ok(())
            }
            Err(e) => {
                self.metrics.failed();
                warn!(order_id = %order_id, attempt, error = %e, "Cook cycle failed");
                if let Err(clear) = self.idempotency.clear(&order_id).await {
                    warn!(order_id = %order_id, error = %clear, "Could not clear processing marker");
                }
                self.notify(order, OrderStatus::Failed, Some(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn on_dead_letter(&self, order: &OrderEnvelope, reason: &str) {
        self.record(order, OrderStatus::Failed, Some(reason.to_string()))
            .await;
    }
}
