//! Durable work queue between the gateway and the kitchen.
//!
//! A single broker task owns the `kitchen.orders` queue and its dead-letter
//! queue `kitchen.orders.dlq`, both persisted in redb. Consumers fetch with
//! prefetch 1: a channel holds at most one unacked delivery, and anything it
//! held goes back to the queue when the channel is dropped or the connection
//! is lost. Retries are delayed requeues carrying an `x-retry-count`.

mod actor;
mod client;
mod consumer;
mod error;
mod store;

pub use actor::{BrokerActor, ConsumerId, Delivery, QueueDepth};
pub use client::{Broker, ConsumerChannel};
pub use consumer::{Consumer, ConsumerConfig, OrderHandler};
pub use error::BrokerError;
pub use store::{DeadLetter, QueueStore, StoredMessage, DEAD_LETTER_QUEUE, ORDERS_QUEUE};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::BrokerMetrics;
    use std::sync::Arc;
    use std::time::Duration;

    fn start() -> Broker {
        let store = QueueStore::open_in_memory().unwrap();
        Broker::start(store, Arc::new(BrokerMetrics::default())).0
    }

    #[tokio::test]
    async fn test_publish_then_ack() {
        let broker = start();
        broker.publish_raw(b"one".to_vec()).await.unwrap();

        let channel = broker.channel();
        let delivery = channel.next().await.unwrap();
        assert_eq!(delivery.payload, b"one");
        assert_eq!(delivery.retry_count, 0);

        channel.ack(delivery.tag).await.unwrap();
        assert_eq!(broker.depth().await.unwrap(), QueueDepth::default());
        assert_eq!(broker.metrics().snapshot().acked, 1);
    }

    #[tokio::test]
    async fn test_prefetch_one_per_channel() {
        let broker = start();
        broker.publish_raw(b"a".to_vec()).await.unwrap();
        broker.publish_raw(b"b".to_vec()).await.unwrap();

        let channel = broker.channel();
        let first = channel.next().await.unwrap();
        assert_eq!(first.payload, b"a");

        let blocked = tokio::time::timeout(Duration::from_millis(50), channel.next()).await;
        assert!(blocked.is_err(), "second delivery must wait for the ack");

        let other = broker.channel();
        assert_eq!(other.next().await.unwrap().payload, b"b");

        channel.ack(first.tag).await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_channel_requeues() {
        let broker = start();
        broker.publish_raw(b"x".to_vec()).await.unwrap();

        let channel = broker.channel();
        let first = channel.next().await.unwrap();
        drop(channel);

        let again = broker.channel().next().await.unwrap();
        assert_eq!(again.tag, first.tag);
        assert_eq!(again.retry_count, 0);
    }

    #[tokio::test]
    async fn test_ack_from_wrong_channel_is_rejected() {
        let broker = start();
        broker.publish_raw(b"x".to_vec()).await.unwrap();

        let owner = broker.channel();
        let delivery = owner.next().await.unwrap();

        let stranger = broker.channel();
        let err = stranger.ack(delivery.tag).await.unwrap_err();
        assert!(matches!(err, BrokerError::UnknownDelivery(tag) if tag == delivery.tag));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_for_delay() {
        let broker = start();
        broker.publish_raw(b"r".to_vec()).await.unwrap();

        let channel = broker.channel();
        let first = channel.next().await.unwrap();
        assert_eq!(channel.retry(first.tag, Duration::from_secs(2)).await.unwrap(), 1);
        assert_eq!(broker.depth().await.unwrap().delayed, 1);

        let early = tokio::time::timeout(Duration::from_millis(1900), channel.next()).await;
        assert!(early.is_err());

        let retried = channel.next().await.unwrap();
        assert_eq!(retried.tag, first.tag);
        assert_eq!(retried.retry_count, 1);
    }

    #[tokio::test]
    async fn test_disconnect_and_redeclare() {
        let broker = start();
        broker.publish_raw(b"d".to_vec()).await.unwrap();

        let channel = broker.channel();
        let held = channel.next().await.unwrap();

        broker.disconnect().await.unwrap();
        assert!(matches!(
            broker.publish_raw(b"lost".to_vec()).await,
            Err(BrokerError::Disconnected)
        ));
        assert!(matches!(channel.next().await, Err(BrokerError::Disconnected)));
        assert!(matches!(channel.ack(held.tag).await, Err(BrokerError::Disconnected)));

        broker.declare_topology().await.unwrap();
        let redelivered = broker.channel().next().await.unwrap();
        assert_eq!(redelivered.tag, held.tag);
    }
}
