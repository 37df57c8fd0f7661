use super::actor::{BrokerActor, BrokerRequest, ConsumerId, Delivery, QueueDepth, Reply};
use super::error::BrokerError;
use super::store::{DeadLetter, QueueStore};
use crate::metrics::BrokerMetrics;
use crate::model::OrderEnvelope;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::instrument;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable handle to the broker task.
#[derive(Clone)]
pub struct Broker {
    sender: mpsc::Sender<BrokerRequest>,
    metrics: Arc<BrokerMetrics>,
    timeout: Duration,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker").field("timeout", &self.timeout).finish()
    }
}

impl Broker {
    /// Spawn the broker over `store`. The handle resolves once every
    /// `Broker` clone is dropped and the queue is closed.
    pub fn start(store: QueueStore, metrics: Arc<BrokerMetrics>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(256);
        let actor = BrokerActor::new(receiver, sender.downgrade(), store, metrics.clone());
        let handle = tokio::spawn(actor.run());
        let broker = Self {
            sender,
            metrics,
            timeout: DEFAULT_TIMEOUT,
        };
        (broker, handle)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &Arc<BrokerMetrics> {
        &self.metrics
    }

    /// Assert the queues exist. Reconnects after a dropped connection.
    pub async fn declare_topology(&self) -> Result<(), BrokerError> {
        self.call(|respond_to| BrokerRequest::Declare { respond_to }).await
    }

    /// Persist an order on the work queue.
    #[instrument(skip(self, envelope), fields(order_id = %envelope.order_id))]
    pub async fn publish(&self, envelope: &OrderEnvelope) -> Result<u64, BrokerError> {
        let payload = serde_json::to_vec(envelope)?;
        self.publish_raw(payload).await
    }

    pub async fn publish_raw(&self, payload: Vec<u8>) -> Result<u64, BrokerError> {
        self.call(|respond_to| BrokerRequest::Publish { payload, respond_to })
            .await
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, BrokerError> {
        self.call(|respond_to| BrokerRequest::DeadLetters { respond_to })
            .await
    }

    pub async fn depth(&self) -> Result<QueueDepth, BrokerError> {
        self.call(|respond_to| BrokerRequest::Depth { respond_to }).await
    }

    /// Sever the connection. Pending fetches fail with `Disconnected` and
    /// every unacked delivery is requeued on the next declare.
    pub async fn disconnect(&self) -> Result<(), BrokerError> {
        self.sender
            .send(BrokerRequest::Disconnect)
            .await
            .map_err(|_| BrokerError::Closed)
    }

    /// Open a consumer channel with prefetch 1.
    pub fn channel(&self) -> ConsumerChannel {
        ConsumerChannel {
            broker: self.clone(),
            id: ConsumerId::new(),
        }
    }

    async fn call<R>(&self, build: impl FnOnce(Reply<R>) -> BrokerRequest) -> Result<R, BrokerError> {
        let (respond_to, response) = oneshot::channel();
        let request = async {
            self.sender
                .send(build(respond_to))
                .await
                .map_err(|_| BrokerError::Closed)?;
            response.await.map_err(|_| BrokerError::Closed)?
        };
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| BrokerError::Timeout(self.timeout))?
    }
}

/// One consumer's view of the queue. Dropping it hands any unacked
/// delivery back to the broker.
#[derive(Debug)]
pub struct ConsumerChannel {
    broker: Broker,
    id: ConsumerId,
}

impl ConsumerChannel {
    /// Wait for the next delivery. Blocks until one is available.
    pub async fn next(&self) -> Result<Delivery, BrokerError> {
        let (respond_to, response) = oneshot::channel();
        self.broker
            .sender
            .send(BrokerRequest::Fetch {
                consumer: self.id,
                respond_to,
            })
            .await
            .map_err(|_| BrokerError::Closed)?;
        response.await.map_err(|_| BrokerError::Closed)?
    }

    pub async fn ack(&self, tag: u64) -> Result<(), BrokerError> {
        let consumer = self.id;
        self.broker
            .call(|respond_to| BrokerRequest::Ack {
                consumer,
                tag,
                respond_to,
            })
            .await
    }

    /// Requeue with a delay; returns the new retry count.
    pub async fn retry(&self, tag: u64, delay: Duration) -> Result<u32, BrokerError> {
        let consumer = self.id;
        self.broker
            .call(|respond_to| BrokerRequest::Retry {
                consumer,
                tag,
                delay,
                respond_to,
            })
            .await
    }

    pub async fn dead_letter(&self, tag: u64, reason: impl Into<String>) -> Result<(), BrokerError> {
        let consumer = self.id;
        let reason = reason.into();
        self.broker
            .call(|respond_to| BrokerRequest::DeadLetter {
                consumer,
                tag,
                reason,
                respond_to,
            })
            .await
    }
}

impl Drop for ConsumerChannel {
    fn drop(&mut self) {
        let _ = self
            .broker
            .sender
            .try_send(BrokerRequest::Release { consumer: self.id });
    }
}
