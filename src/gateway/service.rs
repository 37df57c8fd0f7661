use crate::broker::{Broker, BrokerError};
use crate::cache::Cache;
use crate::clients::{ActorClient, OrderClient};
use crate::error::{AppError, AppResult};
use crate::metrics::GatewayMetrics;
use crate::model::{ItemId, NewOrder, Order, OrderEnvelope, OrderId, OrderLine, OrderStatus};
use crate::stock_ledger::StockLedger;
use serde::{Deserialize, Deserializer, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// `POST /orders` body. `itemId` may be a number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(deserialize_with = "lenient_item_id")]
    pub item_id: ItemId,
    pub quantity: u32,
}

fn lenient_item_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ItemId, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    let raw = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    };
    raw.trim().parse().map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAccepted {
    pub message: String,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub remaining: u32,
}

fn precheck_key(id: ItemId) -> String {
    format!("gateway:stock:{id}")
}

/// Reserves stock, records the order, and queues it for the kitchen.
///
/// If the order cannot be queued after stock was reserved, the reservation
/// is given back with a restock. A restock that also fails is logged with
/// `reconcile = true` and counted in `gateway_reconciliation_pending`.
#[derive(Clone)]
pub struct OrderGateway {
    ledger: StockLedger,
    orders: OrderClient,
    broker: Broker,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
    timeout: Duration,
    metrics: Arc<GatewayMetrics>,
}

impl OrderGateway {
    pub fn new(
        ledger: StockLedger,
        orders: OrderClient,
        broker: Broker,
        cache: Arc<dyn Cache>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            ledger,
            orders,
            broker,
            cache,
            cache_ttl: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            metrics,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Upper bound on each call into the ledger, order store, or broker.
    pub fn with_dependency_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    #[instrument(skip(self, request), fields(item_id = %request.item_id, quantity = request.quantity))]
    pub async fn accept_order(&self, student_id: &str, request: OrderRequest) -> AppResult<OrderAccepted> {
        let OrderRequest { item_id, quantity } = request;
        if quantity == 0 {
            return Err(AppError::Validation("quantity must be positive".into()));
        }

        self.precheck(item_id, quantity).await?;

        let item = self.within("stock ledger", self.ledger.current(item_id)).await?;
        let level = match self
            .within("stock ledger", self.ledger.decrement(item_id, quantity, item.version))
            .await
        {
            Ok(level) => level,
            Err(e) => return Err(self.rejected(item_id, e).await),
        };
        self.remember(item_id, level.remaining).await;

        let order = match self.record(student_id, item_id, quantity).await {
            Ok(order) => order,
            Err(e) => {
                self.compensate(item_id, quantity, None).await;
                return Err(e);
            }
        };

        let published = self
            .within("broker", self.broker.publish(&OrderEnvelope::for_order(&order)))
            .await;
        if let Err(e) = published {
            warn!(order_id = %order.id, error = %e, "Publish failed, releasing reserved stock");
            self.compensate(item_id, quantity, Some(order.id)).await;
            return Err(e);
        }

        info!(order_id = %order.id, student_id, remaining = level.remaining, "Order accepted");
        Ok(OrderAccepted {
            message: "Order accepted".into(),
            order_id: order.id,
            status: order.status,
            remaining: level.remaining,
        })
    }

    /// The order if it exists and belongs to `student_id`.
    pub async fn order_for(&self, student_id: &str, id: OrderId) -> AppResult<Order> {
        let order = self
            .within("order store", self.orders.get(id))
            .await?
            .filter(|order| order.student_id == student_id)
            .ok_or_else(|| AppError::NotFound(format!("Order not found: {id}")))?;
        Ok(order)
    }

    /// Reject early when the cached count already says there isn't enough.
    async fn precheck(&self, item_id: ItemId, quantity: u32) -> AppResult<()> {
        match self.cache.get(&precheck_key(item_id)).await {
            Ok(Some(cached)) => match cached.parse::<u32>() {
                Ok(available) if available < quantity => {
                    self.metrics.stock_rejection();
                    Err(AppError::CacheRejected(format!(
                        "Insufficient stock (cache): requested {quantity}, available {available}"
                    )))
                }
                _ => Ok(()),
            },
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Cache unavailable, skipping stock pre-check");
                Ok(())
            }
        }
    }

    async fn remember(&self, item_id: ItemId, remaining: u32) {
        let value = remaining.to_string();
        if let Err(e) = self.cache.set_ex(&precheck_key(item_id), &value, self.cache_ttl).await {
            warn!(error = %e, "Could not cache remaining stock");
        }
    }

    async fn rejected(&self, item_id: ItemId, e: AppError) -> AppError {
        match &e {
            AppError::VersionConflict(_) => self.metrics.version_conflict(),
            AppError::InsufficientStock(_) => {
                self.metrics.stock_rejection();
                if let Ok(item) = self.ledger.current(item_id).await {
                    self.remember(item_id, item.quantity).await;
                }
            }
            _ => {}
        }
        e
    }

    async fn record(&self, student_id: &str, item_id: ItemId, quantity: u32) -> AppResult<Order> {
        let params = NewOrder {
            student_id: student_id.to_string(),
            items: vec![OrderLine { item_id, quantity }],
        };
        let id = self.within("order store", self.orders.create_order(params)).await?;
        self.within(
            "order store",
            self.orders.advance(id, OrderStatus::StockVerified, None),
        )
        .await
    }

    /// Hand back a reservation that will never be cooked.
    async fn compensate(&self, item_id: ItemId, quantity: u32, order: Option<OrderId>) {
        match self.within("stock ledger", self.ledger.restock(item_id, quantity)).await {
            Ok(level) => {
                info!(%item_id, quantity, remaining = level.remaining, "Reservation released");
                self.remember(item_id, level.remaining).await;
            }
            Err(e) => {
                error!(reconcile = true, %item_id, quantity, error = %e, "Could not release reservation");
                self.metrics.reconciliation_needed();
            }
        }

        if let Some(id) = order {
            let failed = self.orders.advance(id, OrderStatus::Failed, Some("could not be queued".into()));
            if let Err(e) = self.within("order store", failed).await {
                warn!(order_id = %id, error = %e, "Could not mark order failed");
            }
        }
    }

    async fn within<T, E>(&self, dependency: &str, call: impl Future<Output = Result<T, E>>) -> AppResult<T>
    where
        E: Into<AppError>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(AppError::DependencyUnavailable(format!(
                "{dependency} did not answer within {:?}",
                self.timeout
            ))),
        }
    }
}

impl From<BrokerError> for AppError {
    fn from(e: BrokerError) -> Self {
        AppError::DependencyUnavailable(e.to_string())
    }
}
