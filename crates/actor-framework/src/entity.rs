//! # Entities
//!
//! A resource kept by a [`ResourceActor`](crate::ResourceActor) implements
//! [`ActorEntity`]. The associated types fix the wire of the actor (what a
//! create carries, what an update carries, which actions exist and what they
//! return); the hooks hold the resource's rules.
//!
//! `on_update` and `handle_action` run against a clone of the stored value.
//! The clone replaces the stored value only after the hook returned `Ok` and
//! the store accepted the write, so a hook may bail out halfway through.

use async_trait::async_trait;
use std::fmt::{Debug, Display};
use std::hash::Hash;

#[async_trait]
pub trait ActorEntity: Clone + Debug + Send + Sync + 'static {
    /// Ids are handed out by the actor from a counter, hence `From<u32>`.
    type Id: Eq + Hash + Clone + Send + Sync + Display + Debug + From<u32>;

    type Create: Send + Sync + Debug;

    type Update: Send + Sync + Debug;

    /// Resource-specific operations, e.g. a versioned decrement.
    type Action: Send + Sync + Debug;

    type ActionResult: Send + Sync + Debug;

    /// Handed to every hook by [`ResourceActor::run`](crate::ResourceActor::run).
    type Context: Send + Sync;

    /// Recovered on the client side with
    /// [`FrameworkError::downcast_entity`](crate::FrameworkError::downcast_entity).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Build the value for a freshly assigned id. Validation belongs here.
    fn from_create_params(id: Self::Id, params: Self::Create) -> Result<Self, Self::Error>;

    async fn on_create(&mut self, _ctx: &Self::Context) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn on_update(&mut self, update: Self::Update, ctx: &Self::Context) -> Result<(), Self::Error>;

    /// Runs before removal; an error keeps the entity.
    async fn on_delete(&self, _ctx: &Self::Context) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn handle_action(
        &mut self,
        action: Self::Action,
        ctx: &Self::Context,
    ) -> Result<Self::ActionResult, Self::Error>;
}
