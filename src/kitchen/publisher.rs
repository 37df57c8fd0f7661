use super::error::KitchenError;
use crate::model::{NotifyRequest, StatusEvent};
use crate::notify::StatusBus;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Where the worker sends order status changes.
#[async_trait]
pub trait StatusPublisher: Send + Sync + 'static {
    async fn publish(&self, event: &StatusEvent) -> Result<(), KitchenError>;
}

/// Publishes on the in-process status bus.
#[derive(Debug, Clone)]
pub struct BusPublisher {
    bus: StatusBus,
}

impl BusPublisher {
    pub fn new(bus: StatusBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl StatusPublisher for BusPublisher {
    async fn publish(&self, event: &StatusEvent) -> Result<(), KitchenError> {
        let subscribers = self.bus.publish(event.clone());
        debug!(order_id = %event.order_id, status = %event.status, subscribers, "Status published");
        Ok(())
    }
}

/// Posts to a relay's `POST /notify`.
#[derive(Debug, Clone)]
pub struct HttpStatusPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStatusPublisher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, KitchenError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/notify", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl StatusPublisher for HttpStatusPublisher {
    async fn publish(&self, event: &StatusEvent) -> Result<(), KitchenError> {
        let body = NotifyRequest {
            student_id: event.student_id.clone(),
            order_id: event.order_id.clone(),
            status: event.status,
            detail: event.detail.clone(),
        };
        self.client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
