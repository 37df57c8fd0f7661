use super::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::model::{ServerMessage, StatusEvent};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Frames the relay asks a socket task to write.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close,
}

/// Distinguishes successive connections of the same student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

struct Connection {
    id: ConnectionId,
    sender: mpsc::Sender<Outbound>,
    alive: bool,
}

#[derive(Debug)]
enum RelayRequest {
    Register {
        student_id: String,
        sender: mpsc::Sender<Outbound>,
        respond_to: oneshot::Sender<ConnectionId>,
    },
    Unregister {
        student_id: String,
        connection: ConnectionId,
    },
    Pong {
        student_id: String,
        connection: ConnectionId,
    },
    Send {
        student_id: String,
        message: ServerMessage,
        respond_to: oneshot::Sender<bool>,
    },
    Broadcast {
        message: ServerMessage,
        respond_to: oneshot::Sender<usize>,
    },
    Deliver {
        event: StatusEvent,
        respond_to: oneshot::Sender<bool>,
    },
    History {
        student_id: String,
        respond_to: oneshot::Sender<Vec<StatusEvent>>,
    },
    Sweep {
        respond_to: oneshot::Sender<usize>,
    },
    Active {
        respond_to: oneshot::Sender<usize>,
    },
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("alive", &self.alive)
            .finish()
    }
}

/// Default time an offline student's history is kept after their last event.
pub const DEFAULT_HISTORY_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
struct History {
    events: VecDeque<StatusEvent>,
    touched: Option<Instant>,
}

/// Owns the studentId → socket registry and each student's recent history.
/// Nothing else touches either.
pub struct RelayActor {
    receiver: mpsc::Receiver<RelayRequest>,
    connections: HashMap<String, Connection>,
    history: HashMap<String, History>,
    history_cap: usize,
    history_retention: Duration,
    metrics: Arc<RelayMetrics>,
}

impl RelayActor {
    /// Forget students with no live socket and no event for `retention`.
    /// Checked on every heartbeat sweep.
    pub fn with_history_retention(mut self, retention: Duration) -> Self {
        self.history_retention = retention;
        self
    }

    pub async fn run(mut self) {
        info!(history_cap = self.history_cap, "Relay started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                RelayRequest::Register {
                    student_id,
                    sender,
                    respond_to,
                } => {
                    let id = self.register(student_id, sender);
                    let _ = respond_to.send(id);
                }
                RelayRequest::Unregister {
                    student_id,
                    connection,
                } => self.unregister(&student_id, connection),
                RelayRequest::Pong {
                    student_id,
                    connection,
                } => {
                    if let Some(conn) = self.connections.get_mut(&student_id) {
                        if conn.id == connection {
                            conn.alive = true;
                        }
                    }
                }
                RelayRequest::Send {
                    student_id,
                    message,
                    respond_to,
                } => {
                    let delivered = self.send(&student_id, &message);
                    let _ = respond_to.send(delivered);
                }
                RelayRequest::Broadcast {
                    message,
                    respond_to,
                } => {
                    let count = self.broadcast(&message);
                    let _ = respond_to.send(count);
                }
                RelayRequest::Deliver { event, respond_to } => {
                    let delivered = self.deliver(event);
                    let _ = respond_to.send(delivered);
                }
                RelayRequest::History {
                    student_id,
                    respond_to,
                } => {
                    let events = self
                        .history
                        .get(&student_id)
                        .map(|h| h.events.iter().cloned().collect())
                        .unwrap_or_default();
                    let _ = respond_to.send(events);
                }
                RelayRequest::Sweep { respond_to } => {
                    let terminated = self.sweep();
                    let _ = respond_to.send(terminated);
                }
                RelayRequest::Active { respond_to } => {
                    let _ = respond_to.send(self.connections.len());
                }
            }
        }

        for (_, conn) in self.connections.drain() {
            let _ = conn.sender.try_send(Outbound::Close);
        }
        info!("Relay shutdown");
    }

    fn register(&mut self, student_id: String, sender: mpsc::Sender<Outbound>) -> ConnectionId {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let id = ConnectionId(NEXT.fetch_add(1, Ordering::Relaxed));

        let connection = Connection {
            id,
            sender,
            alive: true,
        };
        if let Some(previous) = self.connections.insert(student_id.clone(), connection) {
            let _ = previous.sender.try_send(Outbound::Close);
            self.metrics.evicted();
            info!(student_id = %student_id, "Replaced existing connection");
        }
        self.metrics.registered();
        self.metrics.set_active(self.connections.len());
        info!(student_id = %student_id, active = self.connections.len(), "Student registered");
        id
    }

    fn unregister(&mut self, student_id: &str, connection: ConnectionId) {
        let current = self.connections.get(student_id).map(|c| c.id);
        if current == Some(connection) {
            self.connections.remove(student_id);
            self.metrics.set_active(self.connections.len());
            info!(student_id, "Student disconnected");
        }
    }

    fn send(&mut self, student_id: &str, message: &ServerMessage) -> bool {
        let Some(conn) = self.connections.get(student_id) else {
            warn!(student_id, "No active connection");
            return false;
        };
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(student_id, error = %e, "Could not encode message");
                return false;
            }
        };
        match conn.sender.try_send(Outbound::Text(text)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(student_id, "Connection backlogged, message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(student_id, "Connection already closed");
                self.connections.remove(student_id);
                self.metrics.set_active(self.connections.len());
                false
            }
        }
    }

    fn broadcast(&mut self, message: &ServerMessage) -> usize {
        let Ok(text) = serde_json::to_string(message) else {
            return 0;
        };
        self.connections
            .values()
            .filter(|conn| conn.sender.try_send(Outbound::Text(text.clone())).is_ok())
            .count()
    }

    fn deliver(&mut self, event: StatusEvent) -> bool {
        let history = self.history.entry(event.student_id.clone()).or_default();
        history.events.push_front(event.clone());
        history.events.truncate(self.history_cap);
        history.touched = Some(Instant::now());

        let student_id = event.student_id.clone();
        let order_id = event.order_id.clone();
        let status = event.status;
        let delivered = self.send(&student_id, &ServerMessage::OrderUpdate(event));
        if delivered {
            self.metrics.delivered();
            debug!(student_id = %student_id, order_id = %order_id, %status, "Pushed status update");
        } else {
            self.metrics.dropped();
        }
        delivered
    }

    /// Ping every connection; close the ones that never answered the last ping.
    fn sweep(&mut self) -> usize {
        let dead: Vec<String> = self
            .connections
            .iter()
            .filter(|(_, conn)| !conn.alive)
            .map(|(id, _)| id.clone())
            .collect();

        for student_id in &dead {
            if let Some(conn) = self.connections.remove(student_id) {
                let _ = conn.sender.try_send(Outbound::Close);
                self.metrics.heartbeat_terminated();
                warn!(student_id = %student_id, "No pong since last heartbeat, closing");
            }
        }

        for conn in self.connections.values_mut() {
            conn.alive = false;
            let _ = conn.sender.try_send(Outbound::Ping);
        }
        self.metrics.set_active(self.connections.len());
        self.expire_history();
        dead.len()
    }

    fn expire_history(&mut self) {
        let retention = self.history_retention;
        let connections = &self.connections;
        let before = self.history.len();
        self.history.retain(|student_id, history| {
            connections.contains_key(student_id)
                || history.touched.is_some_and(|at| at.elapsed() < retention)
        });
        let expired = before - self.history.len();
        if expired > 0 {
            debug!(expired, "Dropped idle student histories");
        }
    }
}

/// Handle to the relay task.
#[derive(Debug, Clone)]
pub struct NotificationRelay {
    sender: mpsc::Sender<RelayRequest>,
    metrics: Arc<RelayMetrics>,
}

impl NotificationRelay {
    pub fn new(history_cap: usize, metrics: Arc<RelayMetrics>) -> (RelayActor, Self) {
        let (sender, receiver) = mpsc::channel(256);
        let actor = RelayActor {
            receiver,
            connections: HashMap::new(),
            history: HashMap::new(),
            history_cap: history_cap.max(1),
            history_retention: DEFAULT_HISTORY_RETENTION,
            metrics: metrics.clone(),
        };
        (actor, Self { sender, metrics })
    }

    /// Create the relay and spawn its task.
    pub fn spawn(history_cap: usize, metrics: Arc<RelayMetrics>) -> Self {
        let (actor, relay) = Self::new(history_cap, metrics);
        tokio::spawn(actor.run());
        relay
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    async fn call<R>(&self, build: impl FnOnce(oneshot::Sender<R>) -> RelayRequest) -> Result<R, RelayError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| RelayError::Closed)?;
        response.await.map_err(|_| RelayError::Closed)
    }

    /// Bind `student_id` to a socket, closing any socket it had before.
    pub async fn register(
        &self,
        student_id: &str,
        sender: mpsc::Sender<Outbound>,
    ) -> Result<ConnectionId, RelayError> {
        let student_id = student_id.to_string();
        self.call(|respond_to| RelayRequest::Register {
            student_id,
            sender,
            respond_to,
        })
        .await
    }

    /// Forget a socket. A no-op if the student has since re-registered.
    pub async fn unregister(&self, student_id: &str, connection: ConnectionId) -> Result<(), RelayError> {
        self.sender
            .send(RelayRequest::Unregister {
                student_id: student_id.to_string(),
                connection,
            })
            .await
            .map_err(|_| RelayError::Closed)
    }

    pub async fn pong(&self, student_id: &str, connection: ConnectionId) -> Result<(), RelayError> {
        self.sender
            .send(RelayRequest::Pong {
                student_id: student_id.to_string(),
                connection,
            })
            .await
            .map_err(|_| RelayError::Closed)
    }

    /// `false` when the student has no live socket.
    pub async fn send(&self, student_id: &str, message: ServerMessage) -> Result<bool, RelayError> {
        let student_id = student_id.to_string();
        self.call(|respond_to| RelayRequest::Send {
            student_id,
            message,
            respond_to,
        })
        .await
    }

    /// Returns how many sockets accepted the message.
    pub async fn broadcast(&self, message: ServerMessage) -> Result<usize, RelayError> {
        self.call(|respond_to| RelayRequest::Broadcast {
            message,
            respond_to,
        })
        .await
    }

    /// Record the event in history and push it to the student if connected.
    pub async fn deliver(&self, event: StatusEvent) -> Result<bool, RelayError> {
        self.call(|respond_to| RelayRequest::Deliver { event, respond_to })
            .await
    }

    /// Newest first.
    pub async fn history(&self, student_id: &str) -> Result<Vec<StatusEvent>, RelayError> {
        let student_id = student_id.to_string();
        self.call(|respond_to| RelayRequest::History {
            student_id,
            respond_to,
        })
        .await
    }

    /// Run one heartbeat round; returns the number of connections closed.
    pub async fn sweep(&self) -> Result<usize, RelayError> {
        self.call(|respond_to| RelayRequest::Sweep { respond_to })
            .await
    }

    pub async fn active_connections(&self) -> Result<usize, RelayError> {
        self.call(|respond_to| RelayRequest::Active { respond_to })
            .await
    }
}
