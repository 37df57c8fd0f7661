use crate::broker::{Broker, BrokerError, Consumer, ConsumerConfig, QueueStore};
use crate::cache::{Cache, CacheError, MemoryCache, RedisCache};
use crate::clients::{OrderClient, StockClient};
use crate::config::PipelineConfig;
use crate::gateway::{self, GatewayState, IdentityVerifier, JwtVerifier, OrderGateway};
use crate::kitchen::{
    self, BusPublisher, CookingWorker, HttpStatusPublisher, IdempotencyStore, KitchenError, SimulatedKitchen,
    StatusPublisher,
};
use crate::metrics::{BrokerMetrics, GatewayMetrics, KitchenMetrics, LedgerMetrics, RelayMetrics};
use crate::notify::{self, NotificationRelay, StatusBus};
use crate::stock_ledger::{self, StockLedger};
use crate::model::{Order, StockItem};
use crate::orders;
use actor_framework::{FrameworkError, RedbStore, StoreError};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const STOCK_TABLE: &str = "stock_items";
const ORDERS_TABLE: &str = "orders";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Could not open data directory: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Framework(#[from] FrameworkError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Kitchen(#[from] KitchenError),

    #[error("Task failed: {0}")]
    Task(String),
}

/// Every pipeline component, wired together and running.
///
/// Components talk only through the handles created here: the stock and
/// order actors, the broker, the status bus, and the relay. Each service's
/// router is built from those handles.
pub struct CafeteriaSystem {
    pub config: PipelineConfig,
    pub cache: Arc<dyn Cache>,
    pub ledger: StockLedger,
    pub orders: OrderClient,
    pub broker: Broker,
    pub bus: StatusBus,
    pub relay: NotificationRelay,
    pub gateway: OrderGateway,
    pub idempotency: IdempotencyStore,
    pub kitchen_metrics: Arc<KitchenMetrics>,
    verifier: Arc<dyn IdentityVerifier>,
    consumer: JoinHandle<Result<(), BrokerError>>,
    background: Vec<JoinHandle<()>>,
    actors: Vec<JoinHandle<()>>,
}

impl CafeteriaSystem {
    pub async fn start(config: PipelineConfig) -> Result<Self, SystemError> {
        let cache = connect_cache(&config).await;

        let (stock_store, order_store, queue_store) = match &config.data_dir {
            Some(dir) => open_files(dir)?,
            None => (
                RedbStore::open_in_memory(STOCK_TABLE)?,
                RedbStore::open_in_memory(ORDERS_TABLE)?,
                QueueStore::open_in_memory()?,
            ),
        };

        // 1. Entity actors
        let (stock_actor, stock_client) = stock_ledger::new(stock_store)?;
        let (order_actor, order_client) = orders::new(order_store)?;
        let stock_handle = tokio::spawn(stock_actor.run(()));
        let order_handle = tokio::spawn(order_actor.run(()));

        let stock = StockClient::new(stock_client.with_timeout(config.dependency_timeout));
        let orders = OrderClient::new(order_client.with_timeout(config.dependency_timeout));
        let ledger = StockLedger::new(
            stock,
            cache.clone(),
            config.stock_cache_ttl,
            Arc::new(LedgerMetrics::default()),
        );

        // 2. Broker
        let (broker, broker_handle) = Broker::start(queue_store, Arc::new(BrokerMetrics::default()));
        let broker = broker.with_timeout(config.dependency_timeout);

        // 3. Relay and its feeders
        let bus = StatusBus::default();
        let (relay_actor, relay) = NotificationRelay::new(config.history_cap, Arc::new(RelayMetrics::default()));
        let relay_handle = tokio::spawn(
            relay_actor
                .with_history_retention(config.history_retention)
                .run(),
        );
        let background = vec![
            notify::spawn_subscriber(&bus, relay.clone()),
            notify::spawn_heartbeat(relay.clone(), config.heartbeat_interval),
        ];

        // 4. Cooking worker
        let publisher: Arc<dyn StatusPublisher> = match &config.notify_url {
            Some(url) => Arc::new(HttpStatusPublisher::new(url, config.notify_timeout)?),
            None => Arc::new(BusPublisher::new(bus.clone())),
        };
        let idempotency = IdempotencyStore::new(cache.clone(), config.idempotency_ttl);
        let kitchen_metrics = Arc::new(KitchenMetrics::default());
        let worker = CookingWorker::new(
            idempotency.clone(),
            SimulatedKitchen::new(config.prep_time_min, config.prep_time_max),
            publisher,
            kitchen_metrics.clone(),
        )
        .with_orders(orders.clone())
        .with_notify_timeout(config.notify_timeout);
        let consumer = tokio::spawn(
            Consumer::new(broker.clone(), Arc::new(worker), ConsumerConfig::from(&config)).run(),
        );

        // 5. Gateway
        let gateway = OrderGateway::new(
            ledger.clone(),
            orders.clone(),
            broker.clone(),
            cache.clone(),
            Arc::new(GatewayMetrics::default()),
        )
        .with_cache_ttl(config.gateway_cache_ttl)
        .with_dependency_timeout(config.dependency_timeout);
        let verifier: Arc<dyn IdentityVerifier> = Arc::new(JwtVerifier::new(&config.jwt_secret));

        info!(persistent = config.data_dir.is_some(), "Cafeteria pipeline started");
        Ok(Self {
            config,
            cache,
            ledger,
            orders,
            broker,
            bus,
            relay,
            gateway,
            idempotency,
            kitchen_metrics,
            verifier,
            consumer,
            background,
            actors: vec![stock_handle, order_handle, broker_handle, relay_handle],
        })
    }

    pub fn gateway_router(&self) -> Router {
        gateway::routes::router(GatewayState {
            gateway: self.gateway.clone(),
            verifier: self.verifier.clone(),
        })
    }

    pub fn stock_router(&self) -> Router {
        stock_ledger::routes::router(self.ledger.clone())
    }

    pub fn kitchen_router(&self) -> Router {
        kitchen::routes::router(kitchen::routes::KitchenState {
            broker: self.broker.clone(),
            idempotency: self.idempotency.clone(),
            metrics: self.kitchen_metrics.clone(),
        })
    }

    pub fn relay_router(&self) -> Router {
        notify::routes::router(notify::routes::RelayState {
            relay: self.relay.clone(),
            bus: self.bus.clone(),
            register_timeout: self.config.register_timeout,
        })
    }

    /// Stop the consumer and background tasks, then let every actor drain.
    ///
    /// Routers handed out earlier hold clients too; stop serving them first.
    pub async fn shutdown(self) -> Result<(), SystemError> {
        info!("Shutting down cafeteria pipeline...");

        self.consumer.abort();
        match self.consumer.await {
            Ok(Err(e)) => warn!(error = %e, "Consumer had already stopped"),
            Err(e) if e.is_panic() => error!(error = %e, "Consumer panicked"),
            _ => {}
        }
        for task in self.background {
            task.abort();
            let _ = task.await;
        }

        drop(self.gateway);
        drop(self.ledger);
        drop(self.orders);
        drop(self.broker);
        drop(self.relay);
        drop(self.bus);
        drop(self.idempotency);

        for mut handle in self.actors {
            match tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = ?e, "Actor task failed");
                    return Err(SystemError::Task(e.to_string()));
                }
                Err(_) => {
                    // a detached WebSocket session can still hold a relay handle
                    warn!("Actor did not drain in time, aborting");
                    handle.abort();
                }
            }
        }

        info!("Cafeteria pipeline stopped");
        Ok(())
    }
}

type Stores = (RedbStore<StockItem>, RedbStore<Order>, QueueStore);

fn open_files(dir: &Path) -> Result<Stores, SystemError> {
    std::fs::create_dir_all(dir)?;
    Ok((
        RedbStore::open(dir.join("stock.redb"), STOCK_TABLE)?,
        RedbStore::open(dir.join("orders.redb"), ORDERS_TABLE)?,
        QueueStore::open(dir.join("broker.redb"))?,
    ))
}

/// Redis when configured and reachable, otherwise the in-process cache.
async fn connect_cache(config: &PipelineConfig) -> Arc<dyn Cache> {
    if let Some(url) = &config.redis_url {
        match RedisCache::connect(url).await {
            Ok(cache) => {
                info!("Using Redis cache");
                return Arc::new(cache);
            }
            Err(e) => warn!(error = %e, "Redis unavailable, falling back to in-process cache"),
        }
    }
    Arc::new(MemoryCache::new())
}
