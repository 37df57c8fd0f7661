//! An order as tracked by the order store and carried through the broker.
//!
//! The gateway creates the record (`PENDING`) and moves it to
//! `STOCK_VERIFIED`; the cooking worker drives it to `IN_KITCHEN`, then
//! `READY`. Any non-terminal state may fall to `FAILED`.
use crate::model::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Display;
use std::str::FromStr;

/// Type-safe identifier for orders, rendered as `order-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub u32);

impl From<u32> for OrderId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "order-{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("order-")
            .and_then(|n| n.parse::<u32>().ok())
            .map(OrderId)
            .ok_or_else(|| format!("invalid order id: {s:?}"))
    }
}

impl Serialize for OrderId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    StockVerified,
    InKitchen,
    Ready,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::StockVerified => "STOCK_VERIFIED",
            OrderStatus::InKitchen => "IN_KITCHEN",
            OrderStatus::Ready => "READY",
            OrderStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Ready | OrderStatus::Failed)
    }

    /// Forward-only lifecycle; `FAILED` is reachable from any live state.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, StockVerified)
                | (StockVerified, InKitchen)
                | (InKitchen, Ready)
                | (Pending | StockVerified | InKitchen, Failed)
        )
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub item_id: ItemId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub student_id: String,
    pub items: Vec<OrderLine>,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a new order record.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub student_id: String,
    pub items: Vec<OrderLine>,
}

/// The broker message body: `{orderId, studentId, items, enqueuedAt}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEnvelope {
    pub order_id: OrderId,
    pub student_id: String,
    pub items: Vec<OrderLine>,
    pub enqueued_at: DateTime<Utc>,
}

impl OrderEnvelope {
    pub fn for_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            student_id: order.student_id.clone(),
            items: order.items.clone(),
            enqueued_at: Utc::now(),
        }
    }

    /// Decode and check required fields; anything that fails here is unusable.
    pub fn parse(payload: &[u8]) -> Result<Self, String> {
        let envelope: Self = serde_json::from_slice(payload).map_err(|e| e.to_string())?;
        if envelope.student_id.trim().is_empty() {
            return Err("studentId is empty".into());
        }
        if envelope.items.is_empty() {
            return Err("order has no items".into());
        }
        if envelope.items.iter().any(|line| line.quantity == 0) {
            return Err("item quantity must be positive".into());
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_wire_format() {
        let id = OrderId(100);
        assert_eq!(id.to_string(), "order-100");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"order-100\"");
        assert_eq!("order-100".parse::<OrderId>(), Ok(id));
        assert!("o-5".parse::<OrderId>().is_err());
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_advance_to(StockVerified));
        assert!(InKitchen.can_advance_to(Ready));
        assert!(StockVerified.can_advance_to(Failed));
        assert!(!Pending.can_advance_to(Ready));
        assert!(!Ready.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Pending));
        assert_eq!(serde_json::to_string(&StockVerified).unwrap(), "\"STOCK_VERIFIED\"");
    }

    #[test]
    fn test_envelope_parse_rejects_missing_fields() {
        let ok = br#"{"orderId":"order-1","studentId":"S1","items":[{"itemId":4,"quantity":2}],"enqueuedAt":"2024-01-01T00:00:00Z"}"#;
        assert!(OrderEnvelope::parse(ok).is_ok());

        let no_student = br#"{"orderId":"order-1","studentId":" ","items":[{"itemId":4,"quantity":2}],"enqueuedAt":"2024-01-01T00:00:00Z"}"#;
        assert!(OrderEnvelope::parse(no_student).is_err());
        assert!(OrderEnvelope::parse(b"not json").is_err());
        assert!(OrderEnvelope::parse(br#"{"orderId":"order-1"}"#).is_err());
    }
}
