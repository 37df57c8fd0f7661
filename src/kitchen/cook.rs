use super::error::KitchenError;
use crate::model::OrderEnvelope;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// The part of the worker that actually prepares food.
#[async_trait]
pub trait Kitchen: Send + Sync + 'static {
    /// Prepare the order; returns how long it took.
    async fn cook(&self, order: &OrderEnvelope) -> Result<Duration, KitchenError>;
}

/// Sleeps for a random time in `[min, max]`.
#[derive(Debug, Clone)]
pub struct SimulatedKitchen {
    min: Duration,
    max: Duration,
}

impl SimulatedKitchen {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    fn prep_time(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[async_trait]
impl Kitchen for SimulatedKitchen {
    async fn cook(&self, order: &OrderEnvelope) -> Result<Duration, KitchenError> {
        let prep = self.prep_time();
        debug!(order_id = %order.order_id, ?prep, "Cooking");
        tokio::time::sleep(prep).await;
        Ok(prep)
    }
}
