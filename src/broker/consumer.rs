use super::actor::Delivery;
use super::client::{Broker, ConsumerChannel};
use super::error::BrokerError;
use crate::config::PipelineConfig;
use crate::model::OrderEnvelope;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Processes one order pulled off the queue.
#[async_trait]
pub trait OrderHandler: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `attempt` starts at 1.
    async fn handle(&self, order: &OrderEnvelope, attempt: u32) -> Result<(), Self::Error>;

    /// Called once the order has been moved to the dead-letter queue.
    async fn on_dead_letter(&self, _order: &OrderEnvelope, _reason: &str) {}
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl From<&PipelineConfig> for ConsumerConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: config.reconnect_delay,
        }
    }
}

/// Pulls one delivery at a time and settles it according to the handler's
/// outcome: ack on success, delayed requeue while retries remain, otherwise
/// the dead-letter queue.
pub struct Consumer<H> {
    broker: Broker,
    handler: Arc<H>,
    config: ConsumerConfig,
}

impl<H: OrderHandler> Consumer<H> {
    pub fn new(broker: Broker, handler: Arc<H>, config: ConsumerConfig) -> Self {
        Self {
            broker,
            handler,
            config,
        }
    }

    /// Delay before retry number `retry_count + 1`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        self.config.retry_delay * (retry_count + 1)
    }

    /// Consume until the broker closes or reconnection gives up.
    pub async fn run(self) -> Result<(), BrokerError> {
        let mut channel = self.connect().await?;
        info!(max_retries = self.config.max_retries, "Consumer started");

        loop {
            let delivery = match channel.next().await {
                Ok(delivery) => delivery,
                Err(e) => {
                    warn!(error = %e, "Lost broker connection");
                    drop(channel);
                    channel = self.reconnect().await?;
                    continue;
                }
            };

            if let Err(e) = self.process(&channel, delivery).await {
                warn!(error = %e, "Could not settle delivery");
                if matches!(e, BrokerError::Disconnected | BrokerError::Closed) {
                    drop(channel);
                    channel = self.reconnect().await?;
                }
            }
        }
    }

    async fn reconnect(&self) -> Result<ConsumerChannel, BrokerError> {
        let channel = self.connect().await?;
        self.broker.metrics().reconnected();
        info!("Reconnected to broker");
        Ok(channel)
    }

    async fn connect(&self) -> Result<ConsumerChannel, BrokerError> {
        let attempts = self.config.reconnect_attempts.max(1);
        for attempt in 1..=attempts {
            match self.broker.declare_topology().await {
                Ok(()) => return Ok(self.broker.channel()),
                Err(e) => {
                    warn!(attempt, max = attempts, error = %e, "Broker connect failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.reconnect_delay * attempt).await;
                    }
                }
            }
        }
        error!(attempts, "Giving up on broker");
        Err(BrokerError::ReconnectExhausted(attempts))
    }

    async fn process(&self, channel: &ConsumerChannel, delivery: Delivery) -> Result<(), BrokerError> {
        let tag = delivery.tag;
        let order = match OrderEnvelope::parse(&delivery.payload) {
            Ok(order) => order,
            Err(reason) => {
                error!(tag, %reason, "Unparseable message, dead-lettering");
                return channel.dead_letter(tag, format!("unparseable: {reason}")).await;
            }
        };

        let attempt = delivery.retry_count + 1;
        info!(order_id = %order.order_id, attempt, "Processing order");

        match self.handler.handle(&order, attempt).await {
            Ok(()) => channel.ack(tag).await,
            Err(e) if delivery.retry_count < self.config.max_retries => {
                let delay = self.backoff(delivery.retry_count);
                warn!(order_id = %order.order_id, attempt, ?delay, error = %e, "Order failed, retrying");
                channel.retry(tag, delay).await.map(|_| ())
            }
            Err(e) => {
                let reason = e.to_string();
                error!(order_id = %order.order_id, attempt, error = %reason, "Retries exhausted, dead-lettering");
                channel.dead_letter(tag, reason.clone()).await?;
                self.handler.on_dead_letter(&order, &reason).await;
                Ok(())
            }
        }
    }
}
