//! Notification relay: pushes order status changes to students over
//! WebSocket.
//!
//! Each student has at most one live socket; registering again closes the
//! old one. Events arrive on the [`StatusBus`], are appended to a bounded
//! per-student history (newest first), and pushed if the student is
//! connected. A missed push is only logged: clients catch up through
//! `GET /notify/history/{studentId}` after reconnecting.

mod bus;
mod error;
mod relay;
pub mod routes;
mod socket;
mod tasks;

pub use bus::StatusBus;
pub use error::RelayError;
pub use relay::{ConnectionId, NotificationRelay, Outbound, RelayActor, DEFAULT_HISTORY_RETENTION};
pub use tasks::{spawn_heartbeat, spawn_subscriber};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RelayMetrics;
    use crate::model::{OrderStatus, ServerMessage, StatusEvent};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn relay(cap: usize) -> NotificationRelay {
        NotificationRelay::spawn(cap, Arc::new(RelayMetrics::default()))
    }

    fn event(student: &str, n: u32) -> StatusEvent {
        StatusEvent::now(format!("order-{n}"), student, OrderStatus::InKitchen, None)
    }

    #[tokio::test]
    async fn test_reregister_closes_previous_socket() {
        let relay = relay(5);
        let (first, mut first_rx) = mpsc::channel(8);
        let (second, mut second_rx) = mpsc::channel(8);

        let old = relay.register("S9", first).await.unwrap();
        relay.register("S9", second).await.unwrap();
        assert_eq!(first_rx.recv().await, Some(Outbound::Close));

        // the evicted socket's late unregister must not drop the new one
        relay.unregister("S9", old).await.unwrap();
        assert_eq!(relay.active_connections().await.unwrap(), 1);

        let delivered = relay
            .send("S9", ServerMessage::Error { message: "hi".into() })
            .await
            .unwrap();
        assert!(delivered);
        assert!(matches!(second_rx.recv().await, Some(Outbound::Text(_))));
        assert!(first_rx.try_recv().is_err());
        assert_eq!(relay.metrics().snapshot().evictions, 1);
    }

    #[tokio::test]
    async fn test_send_without_connection_is_false() {
        let relay = relay(5);
        let delivered = relay
            .send("nobody", ServerMessage::Error { message: "x".into() })
            .await
            .unwrap();
        assert!(!delivered);
    }

    #[tokio::test]
    async fn test_deliver_records_history_even_when_offline() {
        let relay = relay(3);
        for n in 1..=5 {
            assert!(!relay.deliver(event("S1", n)).await.unwrap());
        }

        let history = relay.history("S1").await.unwrap();
        let ids: Vec<&str> = history.iter().map(|e| e.order_id.as_str()).collect();
        assert_eq!(ids, vec!["order-5", "order-4", "order-3"]);
        assert_eq!(relay.metrics().snapshot().dropped, 5);
        assert!(relay.history("S2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_counts_open_sockets() {
        let relay = relay(3);
        let (a, _a_rx) = mpsc::channel(8);
        let (b, b_rx) = mpsc::channel(8);
        relay.register("A", a).await.unwrap();
        relay.register("B", b).await.unwrap();
        drop(b_rx);

        let count = relay
            .broadcast(ServerMessage::Error { message: "closing".into() })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_sweep_closes_silent_connections() {
        let relay = relay(3);
        let (quiet, mut quiet_rx) = mpsc::channel(8);
        let (chatty, mut chatty_rx) = mpsc::channel(8);
        relay.register("quiet", quiet).await.unwrap();
        let chatty_id = relay.register("chatty", chatty).await.unwrap();

        assert_eq!(relay.sweep().await.unwrap(), 0);
        assert_eq!(quiet_rx.recv().await, Some(Outbound::Ping));
        assert_eq!(chatty_rx.recv().await, Some(Outbound::Ping));

        relay.pong("chatty", chatty_id).await.unwrap();
        assert_eq!(relay.sweep().await.unwrap(), 1);
        assert_eq!(quiet_rx.recv().await, Some(Outbound::Close));
        assert_eq!(chatty_rx.recv().await, Some(Outbound::Ping));
        assert_eq!(relay.active_connections().await.unwrap(), 1);
        assert_eq!(relay.metrics().snapshot().heartbeat_terminations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_forgets_idle_offline_students() {
        let (actor, relay) = NotificationRelay::new(3, Arc::new(RelayMetrics::default()));
        tokio::spawn(actor.with_history_retention(Duration::from_secs(60)).run());
        let (socket, _socket_rx) = mpsc::channel(8);
        let online = relay.register("online", socket).await.unwrap();

        relay.deliver(event("online", 1)).await.unwrap();
        relay.deliver(event("gone", 2)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        relay.deliver(event("recent", 3)).await.unwrap();
        relay.sweep().await.unwrap();
        assert_eq!(relay.history("gone").await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        relay.pong("online", online).await.unwrap();
        relay.sweep().await.unwrap();
        assert!(relay.history("gone").await.unwrap().is_empty());
        assert_eq!(relay.history("recent").await.unwrap().len(), 1);
        assert_eq!(relay.history("online").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_forwards_bus_events() {
        let relay = relay(3);
        let bus = StatusBus::new(16);
        let (socket, mut socket_rx) = mpsc::channel(8);
        relay.register("S1", socket).await.unwrap();
        spawn_subscriber(&bus, relay.clone());

        bus.publish(event("S1", 7));

        match socket_rx.recv().await {
            Some(Outbound::Text(text)) => {
                let json: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(json["type"], "order_update");
                assert_eq!(json["orderId"], "order-7");
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
}
