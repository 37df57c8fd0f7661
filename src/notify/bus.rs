use crate::model::StatusEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// In-process pub/sub channel carrying status updates from the kitchen to
/// the relay.
#[derive(Debug, Clone)]
pub struct StatusBus {
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns how many subscribers saw the event.
    pub fn publish(&self, event: StatusEvent) -> usize {
        match self.sender.send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                debug!(order_id = %event.order_id, "No status subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(256)
    }
}
