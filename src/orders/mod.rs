//! # Order Store
//!
//! Order records live in a `ResourceActor<Order>` backed by redb. The record
//! only moves forward through the status lifecycle, via
//! [`OrderAction::Advance`]; see [`OrderStatus::can_advance_to`](crate::model::OrderStatus::can_advance_to).

pub mod actions;
pub mod entity;
pub mod error;

pub use actions::*;
pub use error::*;

use crate::model::Order;
use actor_framework::{EntityStore, FrameworkError, ResourceActor, ResourceClient};

/// Creates the order actor over `store` and its client.
pub fn new<S: EntityStore<Order>>(
    store: S,
) -> Result<(ResourceActor<Order, S>, ResourceClient<Order>), FrameworkError> {
    ResourceActor::with_store(64, store)
}
