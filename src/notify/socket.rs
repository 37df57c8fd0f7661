//! One WebSocket session: register handshake, then pump frames both ways.

use super::relay::{NotificationRelay, Outbound};
use crate::model::{ClientMessage, ServerMessage};
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const OUTBOUND_BUFFER: usize = 32;

/// A client that stops reading must not pin its session forever.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn serve(socket: WebSocket, relay: NotificationRelay, register_timeout: Duration) {
    let (mut sink, mut stream) = socket.split();

    let student_id = match tokio::time::timeout(register_timeout, await_register(&mut stream)).await {
        Ok(Some(student_id)) => student_id,
        Ok(None) => return,
        Err(_) => {
            warn!("No register message in time, closing");
            let error = encode(&ServerMessage::Error {
                message: "registration timed out".into(),
            });
            if push(&mut sink, error, SEND_TIMEOUT).await {
                push(&mut sink, Message::Close(None), SEND_TIMEOUT).await;
            }
            return;
        }
    };

    let (sender, mut outbound) = mpsc::channel(OUTBOUND_BUFFER);
    let Ok(connection) = relay.register(&student_id, sender).await else {
        push(&mut sink, Message::Close(None), SEND_TIMEOUT).await;
        return;
    };
    let ack = ServerMessage::Registered {
        student_id: student_id.clone(),
    };
    if !push(&mut sink, encode(&ack), SEND_TIMEOUT).await {
        let _ = relay.unregister(&student_id, connection).await;
        return;
    }

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if !push(&mut sink, Message::Text(text.into()), SEND_TIMEOUT).await {
                        break;
                    }
                }
                Some(Outbound::Ping) => {
                    if !push(&mut sink, Message::Ping(Bytes::new()), SEND_TIMEOUT).await {
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    push(&mut sink, Message::Close(None), SEND_TIMEOUT).await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Pong(_))) => {
                    let _ = relay.pong(&student_id, connection).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(other)) => debug!(student_id = %student_id, ?other, "Ignoring client frame"),
            },
        }
    }

    let _ = relay.unregister(&student_id, connection).await;
}

/// Send one frame, giving up after `limit`. `false` means the session is over.
async fn push<S>(sink: &mut S, message: Message, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
{
    match tokio::time::timeout(limit, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            warn!(?limit, "Client stopped reading, dropping session");
            false
        }
    }
}

/// Read frames until a valid `register` arrives. `None` if the client leaves.
async fn await_register(stream: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        };
        match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::Register { student_id }) if !student_id.trim().is_empty() => {
                return Some(student_id);
            }
            Ok(_) => warn!("Register message without studentId"),
            Err(e) => warn!(error = %e, "Invalid message before register"),
        }
    }
    None
}

fn encode(message: &ServerMessage) -> Message {
    let text = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());
    Message::Text(text.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Never ready, like a socket whose peer stopped reading.
    struct Stalled;

    impl Sink<Message> for Stalled {
        type Error = ();

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), ()>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), ()> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), ()>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), ()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_gives_up_on_stalled_client() {
        let started = tokio::time::Instant::now();
        assert!(!push(&mut Stalled, Message::Ping(Bytes::new()), SEND_TIMEOUT).await);
        assert!(started.elapsed() >= SEND_TIMEOUT);
    }

    #[tokio::test]
    async fn test_push_delivers_and_reports_closed_peer() {
        let (mut tx, mut rx) = futures::channel::mpsc::channel::<Message>(4);
        let ack = encode(&ServerMessage::Registered {
            student_id: "S1".into(),
        });
        assert!(push(&mut tx, ack, SEND_TIMEOUT).await);
        assert!(matches!(rx.next().await, Some(Message::Text(_))));

        drop(rx);
        assert!(!push(&mut tx, Message::Close(None), SEND_TIMEOUT).await);
    }
}
