//! # Stock Ledger
//!
//! The only source of truth for quantities. One `ResourceActor<StockItem>`
//! owns every item and writes through to redb; concurrent decrements on the
//! same item are serialized by the actor's mailbox and guarded by the item
//! version, so a stale caller gets `VersionConflict` instead of a lost update.
//!
//! - [`entity`]: `ActorEntity` for [`StockItem`](crate::model::StockItem)
//! - [`actions`]: [`StockAction`] (CAS decrement, restock)
//! - [`error`]: [`StockError`]
//! - [`ledger`]: [`StockLedger`], the cache-aside facade used by callers
//! - [`routes`]: HTTP API

pub mod actions;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod routes;

pub use actions::*;
pub use error::*;
pub use ledger::StockLedger;

use crate::model::StockItem;
use actor_framework::{EntityStore, FrameworkError, ResourceActor, ResourceClient};

/// Creates the stock actor over `store` and its client.
pub fn new<S: EntityStore<StockItem>>(
    store: S,
) -> Result<(ResourceActor<StockItem, S>, ResourceClient<StockItem>), FrameworkError> {
    ResourceActor::with_store(64, store)
}
