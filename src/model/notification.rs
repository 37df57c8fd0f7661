//! Status events and the WebSocket wire protocol of the notification relay.

use crate::model::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One status change for one order, as fanned out to the student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub order_id: String,
    pub student_id: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn now(
        order_id: impl Into<String>,
        student_id: impl Into<String>,
        status: OrderStatus,
        detail: Option<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            student_id: student_id.into(),
            status,
            detail,
            timestamp: Utc::now(),
        }
    }
}

/// `POST /notify` body. `status` must be one of the known order states.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub student_id: String,
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Messages a client sends over the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Register {
        #[serde(rename = "studentId")]
        student_id: String,
    },
}

/// Messages the relay pushes to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Registered {
        #[serde(rename = "studentId")]
        student_id: String,
    },
    OrderUpdate(StatusEvent),
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shapes() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"register","studentId":"S9"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Register { student_id: "S9".into() });

        let event = StatusEvent::now("order-1", "S9", OrderStatus::Ready, None);
        let json = serde_json::to_value(ServerMessage::OrderUpdate(event)).unwrap();
        assert_eq!(json["type"], "order_update");
        assert_eq!(json["orderId"], "order-1");
        assert_eq!(json["status"], "READY");

        let bad: Result<NotifyRequest, _> =
            serde_json::from_str(r#"{"studentId":"S1","orderId":"order-1","status":"COOKED"}"#);
        assert!(bad.is_err());
    }
}
