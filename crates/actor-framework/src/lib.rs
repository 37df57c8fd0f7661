//! # Actor Framework
//!
//! A small resource-oriented actor framework on top of tokio.
//!
//! Each resource type (a stock item, an order record, ...) is an [`ActorEntity`].
//! A [`ResourceActor`] owns every instance of that type inside one task and
//! serves CRUD, `List` and resource-specific `Action` requests sent through a
//! cloneable [`ResourceClient`]. Because one task owns the map, compare-and-swap
//! style actions need no locks: they are serialized by the mailbox.
//!
//! ## Layers
//!
//! 1. **Entity** ([`ActorEntity`]): state plus lifecycle hooks.
//! 2. **Actor** ([`ResourceActor`]): the sequential message loop.
//! 3. **Store** ([`EntityStore`]): where the actor writes through, memory or redb.
//! 4. **Client** ([`ResourceClient`], [`ActorClient`]): typed async API with
//!    optional per-request timeout.
//!
//! ## Quick Start
//!
//! ```rust
//! use actor_framework::{ActorEntity, FrameworkError, ResourceActor};
//! use async_trait::async_trait;
//!
//! #[derive(Clone, Debug)]
//! struct Ticket { id: u32, left: u32 }
//!
//! #[derive(Debug)] struct NewTicket { left: u32 }
//! #[derive(Debug)] struct Refill(u32);
//! #[derive(Debug)] enum TicketAction { Take }
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("sold out")]
//! struct SoldOut;
//!
//! #[async_trait]
//! impl ActorEntity for Ticket {
//!     type Id = u32;
//!     type Create = NewTicket;
//!     type Update = Refill;
//!     type Action = TicketAction;
//!     type ActionResult = u32;
//!     type Context = ();
//!     type Error = SoldOut;
//!
//!     fn from_create_params(id: u32, params: NewTicket) -> Result<Self, Self::Error> {
//!         Ok(Self { id, left: params.left })
//!     }
//!
//!     async fn on_update(&mut self, update: Refill, _: &()) -> Result<(), Self::Error> {
//!         self.left = update.0;
//!         Ok(())
//!     }
//!
//!     async fn handle_action(&mut self, action: TicketAction, _: &()) -> Result<u32, Self::Error> {
//!         match action {
//!             TicketAction::Take if self.left > 0 => {
//!                 self.left -= 1;
//!                 Ok(self.left)
//!             }
//!             TicketAction::Take => Err(SoldOut),
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, client) = ResourceActor::<Ticket>::new(16);
//!     tokio::spawn(actor.run(()));
//!
//!     let id = client.create(NewTicket { left: 1 }).await.unwrap();
//!     assert_eq!(client.perform_action(id, TicketAction::Take).await.unwrap(), 0);
//!
//!     let err = client.perform_action(id, TicketAction::Take).await.unwrap_err();
//!     assert!(matches!(err.downcast_entity::<SoldOut>(), Ok(SoldOut)));
//! }
//! ```
//!
//! ## Testing
//!
//! See the [`mock`] module for `MockClient` and the raw-receiver helpers.

pub mod actor;
pub mod client;
pub mod client_trait;
pub mod entity;
pub mod error;
pub mod message;
pub mod mock;
pub mod store;
pub mod tracing;

pub use actor::ResourceActor;
pub use client::ResourceClient;
pub use client_trait::ActorClient;
pub use entity::ActorEntity;
pub use error::{FrameworkError, StoreError};
pub use message::{ResourceRequest, Response};
pub use store::{EntityStore, MemoryStore, RedbStore, Snapshot};
