use super::bus::StatusBus;
use super::relay::NotificationRelay;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Forward every event on the bus to the relay until the bus closes.
pub fn spawn_subscriber(bus: &StatusBus, relay: NotificationRelay) -> JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        info!("Status subscriber started");
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(order_id = %event.order_id, status = %event.status, "Status event");
                    if relay.deliver(event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status subscriber fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("Status subscriber stopped");
    })
}

/// Sweep the registry every `interval` until the relay shuts down.
pub fn spawn_heartbeat(relay: NotificationRelay, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match relay.sweep().await {
                Ok(0) => {}
                Ok(terminated) => info!(terminated, "Heartbeat closed stale connections"),
                Err(_) => break,
            }
        }
    })
}
