//! Order gateway: the only entry point for students.
//!
//! `POST /orders` authenticates the bearer token, rejects early from the
//! cached stock count, reserves stock with a versioned decrement, records the
//! order, and queues it for the kitchen. Cooking and readiness are reported
//! asynchronously through the notification relay.

mod auth;
pub mod routes;
mod service;

pub use auth::{bearer_token, AuthError, Claims, IdentityVerifier, JwtVerifier};
pub use routes::{GatewayState, Student};
pub use service::{OrderAccepted, OrderGateway, OrderRequest};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_accepts_number_or_string() {
        let from_number: OrderRequest = serde_json::from_str(r#"{"itemId": 4, "quantity": 1}"#).unwrap();
        let from_text: OrderRequest = serde_json::from_str(r#"{"itemId": "4", "quantity": 1}"#).unwrap();
        assert_eq!(from_number.item_id, from_text.item_id);

        assert!(serde_json::from_str::<OrderRequest>(r#"{"itemId": "abc", "quantity": 1}"#).is_err());
        assert!(serde_json::from_str::<OrderRequest>(r#"{"itemId": 0, "quantity": 1}"#).is_err());
        assert!(serde_json::from_str::<OrderRequest>(r#"{"itemId": 4, "quantity": -1}"#).is_err());
        assert!(serde_json::from_str::<OrderRequest>(r#"{"quantity": 1}"#).is_err());
    }
}
