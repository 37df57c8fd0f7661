use super::error::BrokerError;
use super::store::{DeadLetter, QueueStore, StoredMessage};
use crate::metrics::BrokerMetrics;
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, BrokerError>>;

/// Identifies one consumer channel. Deliveries are pinned to it until settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(Uuid);

impl ConsumerId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A message handed to a consumer. `tag` is used to settle it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: u64,
    pub payload: Vec<u8>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub ready: usize,
    pub delayed: usize,
    pub unacked: usize,
}

#[derive(Debug)]
pub(crate) enum BrokerRequest {
    Declare {
        respond_to: Reply<()>,
    },
    Publish {
        payload: Vec<u8>,
        respond_to: Reply<u64>,
    },
    Fetch {
        consumer: ConsumerId,
        respond_to: Reply<Delivery>,
    },
    Ack {
        consumer: ConsumerId,
        tag: u64,
        respond_to: Reply<()>,
    },
    Retry {
        consumer: ConsumerId,
        tag: u64,
        delay: Duration,
        respond_to: Reply<u32>,
    },
    DeadLetter {
        consumer: ConsumerId,
        tag: u64,
        reason: String,
        respond_to: Reply<()>,
    },
    /// The consumer went away; its unacked delivery goes back to the queue.
    Release {
        consumer: ConsumerId,
    },
    DeadLetters {
        respond_to: Reply<Vec<DeadLetter>>,
    },
    Depth {
        respond_to: Reply<QueueDepth>,
    },
    /// Drop the connection as if the network failed.
    Disconnect,
    /// A delayed message may have become due.
    Wake,
}

/// Owns the queue. Consumers get at most one unacked delivery each.
pub struct BrokerActor {
    receiver: mpsc::Receiver<BrokerRequest>,
    wake: mpsc::WeakSender<BrokerRequest>,
    store: QueueStore,
    metrics: Arc<BrokerMetrics>,
    connected: bool,
    ready: BTreeMap<u64, StoredMessage>,
    delayed: HashMap<u64, (Instant, StoredMessage)>,
    in_flight: HashMap<u64, (ConsumerId, StoredMessage)>,
    waiters: VecDeque<(ConsumerId, Reply<Delivery>)>,
}

impl BrokerActor {
    pub(crate) fn new(
        receiver: mpsc::Receiver<BrokerRequest>,
        wake: mpsc::WeakSender<BrokerRequest>,
        store: QueueStore,
        metrics: Arc<BrokerMetrics>,
    ) -> Self {
        Self {
            receiver,
            wake,
            store,
            metrics,
            connected: false,
            ready: BTreeMap::new(),
            delayed: HashMap::new(),
            in_flight: HashMap::new(),
            waiters: VecDeque::new(),
        }
    }

    pub async fn run(mut self) {
        match self.connect() {
            Ok(()) => info!(
                ready = self.ready.len(),
                delayed = self.delayed.len(),
                "Broker started"
            ),
            Err(e) => warn!(error = %e, "Broker started without a connection"),
        }

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                BrokerRequest::Declare { respond_to } => {
                    let result = if self.connected { Ok(()) } else { self.connect() };
                    let _ = respond_to.send(result);
                }
                BrokerRequest::Publish {
                    payload,
                    respond_to,
                } => {
                    let result = self.publish(payload);
                    let _ = respond_to.send(result);
                }
                BrokerRequest::Fetch {
                    consumer,
                    respond_to,
                } => {
                    if self.connected {
                        self.waiters.push_back((consumer, respond_to));
                    } else {
                        let _ = respond_to.send(Err(BrokerError::Disconnected));
                    }
                }
                BrokerRequest::Ack {
                    consumer,
                    tag,
                    respond_to,
                } => {
                    let result = self.ack(consumer, tag);
                    let _ = respond_to.send(result);
                }
                BrokerRequest::Retry {
                    consumer,
                    tag,
                    delay,
                    respond_to,
                } => {
                    let result = self.retry(consumer, tag, delay);
                    let _ = respond_to.send(result);
                }
                BrokerRequest::DeadLetter {
                    consumer,
                    tag,
                    reason,
                    respond_to,
                } => {
                    let result = self.dead_letter(consumer, tag, reason);
                    let _ = respond_to.send(result);
                }
                BrokerRequest::Release { consumer } => self.release(consumer),
                BrokerRequest::DeadLetters { respond_to } => {
                    let result = self.store.dead_letters().map_err(BrokerError::from);
                    let _ = respond_to.send(result);
                }
                BrokerRequest::Depth { respond_to } => {
                    let _ = respond_to.send(Ok(QueueDepth {
                        ready: self.ready.len(),
                        delayed: self.delayed.len(),
                        unacked: self.in_flight.len(),
                    }));
                }
                BrokerRequest::Disconnect => self.disconnect(),
                BrokerRequest::Wake => {}
            }
            self.dispatch();
        }

        info!(
            ready = self.ready.len(),
            unacked = self.in_flight.len(),
            "Broker shutdown"
        );
    }

    /// Declare the queues and rebuild in-memory state from the store.
    fn connect(&mut self) -> Result<(), BrokerError> {
        self.store.declare()?;
        let messages = self.store.load()?;

        self.ready.clear();
        self.delayed.clear();
        self.in_flight.clear();

        let now_ms = Utc::now().timestamp_millis();
        for (seq, message) in messages {
            match message.not_before_ms {
                Some(at) if at > now_ms => {
                    let due = Instant::now() + Duration::from_millis((at - now_ms) as u64);
                    self.schedule_wake(due);
                    self.delayed.insert(seq, (due, message));
                }
                _ => {
                    self.ready.insert(seq, message);
                }
            }
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        warn!(
            waiters = self.waiters.len(),
            unacked = self.in_flight.len(),
            "Broker connection dropped"
        );
        self.connected = false;
        for (_, waiter) in self.waiters.drain(..) {
            let _ = waiter.send(Err(BrokerError::Disconnected));
        }
    }

    fn publish(&mut self, payload: Vec<u8>) -> Result<u64, BrokerError> {
        if !self.connected {
            return Err(BrokerError::Disconnected);
        }
        let message = StoredMessage::new(payload);
        let seq = self.store.append(&message)?;
        self.ready.insert(seq, message);
        self.metrics.published();
        debug!(seq, "Published");
        Ok(seq)
    }

    fn ack(&mut self, consumer: ConsumerId, tag: u64) -> Result<(), BrokerError> {
        self.settle(consumer, tag)?;
        self.store.remove(tag)?;
        self.in_flight.remove(&tag);
        self.metrics.acked();
        debug!(tag, "Acked");
        Ok(())
    }

    fn retry(&mut self, consumer: ConsumerId, tag: u64, delay: Duration) -> Result<u32, BrokerError> {
        let mut message = self.settle(consumer, tag)?;
        message.retry_count += 1;
        message.not_before_ms = Some(Utc::now().timestamp_millis() + delay.as_millis() as i64);
        self.store.update(tag, &message)?;

        self.in_flight.remove(&tag);
        let due = Instant::now() + delay;
        self.schedule_wake(due);
        let retry_count = message.retry_count;
        self.delayed.insert(tag, (due, message));
        self.metrics.retried();
        debug!(tag, retry_count, ?delay, "Scheduled retry");
        Ok(retry_count)
    }

    fn dead_letter(&mut self, consumer: ConsumerId, tag: u64, reason: String) -> Result<(), BrokerError> {
        let message = self.settle(consumer, tag)?;
        let letter = DeadLetter {
            seq: tag,
            payload: String::from_utf8_lossy(&message.payload).into_owned(),
            retry_count: message.retry_count,
            reason,
            dead_lettered_at: Utc::now(),
        };
        self.store.dead_letter(&letter)?;
        self.in_flight.remove(&tag);
        self.metrics.dead_lettered();
        warn!(tag, reason = %letter.reason, "Dead-lettered");
        Ok(())
    }

    fn release(&mut self, consumer: ConsumerId) {
        self.waiters.retain(|(owner, _)| *owner != consumer);
        let held: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, (owner, _))| *owner == consumer)
            .map(|(tag, _)| *tag)
            .collect();
        for tag in held {
            if let Some((_, message)) = self.in_flight.remove(&tag) {
                debug!(tag, "Requeued unacked delivery");
                self.ready.insert(tag, message);
            }
        }
    }

    /// Check that `consumer` holds `tag` and return a copy of the message.
    fn settle(&self, consumer: ConsumerId, tag: u64) -> Result<StoredMessage, BrokerError> {
        if !self.connected {
            return Err(BrokerError::Disconnected);
        }
        match self.in_flight.get(&tag) {
            Some((owner, message)) if *owner == consumer => Ok(message.clone()),
            _ => Err(BrokerError::UnknownDelivery(tag)),
        }
    }

    fn dispatch(&mut self) {
        if !self.connected {
            return;
        }

        let now = Instant::now();
        let due: Vec<u64> = self
            .delayed
            .iter()
            .filter(|(_, (at, _))| *at <= now)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in due {
            if let Some((_, message)) = self.delayed.remove(&seq) {
                self.ready.insert(seq, message);
            }
        }

        let mut parked = VecDeque::new();
        while let Some(&seq) = self.ready.keys().next() {
            let Some((consumer, waiter)) = self.waiters.pop_front() else {
                break;
            };
            let busy = self.in_flight.values().any(|(owner, _)| *owner == consumer);
            if busy {
                parked.push_back((consumer, waiter));
                continue;
            }
            if waiter.is_closed() {
                continue;
            }
            let Some(message) = self.ready.remove(&seq) else {
                break;
            };
            let delivery = Delivery {
                tag: seq,
                payload: message.payload.clone(),
                retry_count: message.retry_count,
            };
            if waiter.send(Ok(delivery)).is_ok() {
                self.in_flight.insert(seq, (consumer, message));
                self.metrics.delivered();
            } else {
                self.ready.insert(seq, message);
            }
        }
        parked.extend(self.waiters.drain(..));
        self.waiters = parked;
    }

    fn schedule_wake(&self, at: Instant) {
        let wake = self.wake.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            if let Some(sender) = wake.upgrade() {
                let _ = sender.send(BrokerRequest::Wake).await;
            }
        });
    }
}
