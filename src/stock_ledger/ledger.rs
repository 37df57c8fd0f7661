//! Cache-aside facade over the stock actor.
//!
//! Reads try the cache first and fall back to the actor, repopulating the
//! cache with a TTL. Every successful write drops the per-item key and the
//! aggregate listing key. Cache trouble is logged and otherwise ignored.

use crate::cache::Cache;
use crate::clients::{ActorClient, StockClient};
use crate::metrics::LedgerMetrics;
use crate::model::{ItemId, NewStockItem, StockItem, StockLevel};
use crate::stock_ledger::StockError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const ALL_ITEMS_KEY: &str = "stocks:all";

fn item_key(id: ItemId) -> String {
    format!("stock:{id}")
}

#[derive(Clone)]
pub struct StockLedger {
    client: StockClient,
    cache: Arc<dyn Cache>,
    ttl: Duration,
    metrics: Arc<LedgerMetrics>,
}

impl StockLedger {
    pub fn new(client: StockClient, cache: Arc<dyn Cache>, ttl: Duration, metrics: Arc<LedgerMetrics>) -> Self {
        Self {
            client,
            cache,
            ttl,
            metrics,
        }
    }

    pub fn metrics(&self) -> &LedgerMetrics {
        &self.metrics
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub async fn get(&self, id: ItemId) -> Result<StockItem, StockError> {
        let key = item_key(id);
        if let Some(item) = self.cached::<StockItem>(&key).await {
            return Ok(item);
        }

        let item = self
            .client
            .get(id)
            .await?
            .ok_or_else(|| StockError::NotFound(id.to_string()))?;
        self.populate(&key, &item).await;
        Ok(item)
    }

    /// Read straight from the actor, skipping the cache. Use this to pick the
    /// expected version for [`decrement`](Self::decrement).
    pub async fn current(&self, id: ItemId) -> Result<StockItem, StockError> {
        self.client
            .get(id)
            .await?
            .ok_or_else(|| StockError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<StockItem>, StockError> {
        if let Some(items) = self.cached::<Vec<StockItem>>(ALL_ITEMS_KEY).await {
            return Ok(items);
        }

        let mut items = self.client.list().await?;
        items.sort_by_key(|item| item.id);
        self.populate(ALL_ITEMS_KEY, &items).await;
        Ok(items)
    }

    pub async fn create(&self, params: NewStockItem) -> Result<StockItem, StockError> {
        let id = self.client.create_item(params).await?;
        self.drop_listing().await;
        self.client
            .get(id)
            .await?
            .ok_or_else(|| StockError::NotFound(id.to_string()))
    }

    pub async fn set_quantity(&self, id: ItemId, quantity: u32) -> Result<StockItem, StockError> {
        let item = self.client.set_quantity(id, quantity).await?;
        self.invalidate(id).await;
        Ok(item)
    }

    /// Compare-and-swap decrement; see [`StockAction::Decrement`](super::StockAction::Decrement).
    pub async fn decrement(&self, id: ItemId, amount: u32, expected_version: u64) -> Result<StockLevel, StockError> {
        match self.client.decrement(id, amount, expected_version).await {
            Ok(level) => {
                self.metrics.decremented();
                self.invalidate(id).await;
                Ok(level)
            }
            Err(e) => {
                match &e {
                    StockError::VersionConflict { .. } => {
                        self.metrics.version_conflict();
                        // drop a possibly stale cached version
                        self.invalidate(id).await;
                    }
                    StockError::InsufficientStock { .. } => self.metrics.insufficient(),
                    _ => {}
                }
                Err(e)
            }
        }
    }

    pub async fn restock(&self, id: ItemId, amount: u32) -> Result<StockLevel, StockError> {
        let level = self.client.restock(id, amount).await?;
        self.invalidate(id).await;
        Ok(level)
    }

    pub async fn delete(&self, id: ItemId) -> Result<(), StockError> {
        self.client.delete(id).await?;
        self.invalidate(id).await;
        Ok(())
    }

    async fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get_json::<T>(key).await {
            Ok(Some(value)) => {
                debug!(key, "Cache HIT");
                self.metrics.cache_hit();
                Some(value)
            }
            Ok(None) => {
                self.metrics.cache_miss();
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, falling back to ledger");
                self.metrics.cache_miss();
                None
            }
        }
    }

    async fn populate<T: serde::Serialize + Sync>(&self, key: &str, value: &T) {
        if let Err(e) = self.cache.set_json(key, value, self.ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    async fn invalidate(&self, id: ItemId) {
        if let Err(e) = self.cache.delete(&item_key(id)).await {
            warn!(%id, error = %e, "Cache invalidation failed");
        }
        self.drop_listing().await;
    }

    async fn drop_listing(&self) {
        if let Err(e) = self.cache.delete(ALL_ITEMS_KEY).await {
            warn!(error = %e, "Cache invalidation failed for listing");
        }
    }
}
