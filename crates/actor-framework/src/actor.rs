//! # Generic Actor Server
//!
//! `ResourceActor` owns the entities of one type and processes requests for them
//! one at a time, so the map needs no lock. Every mutation is written through an
//! [`EntityStore`] before it becomes visible; if the store refuses the write the
//! caller gets `FrameworkError::Store` and the in-memory state is left untouched.

use crate::client::ResourceClient;
use crate::entity::ActorEntity;
use crate::error::FrameworkError;
use crate::message::ResourceRequest;
use crate::store::{EntityStore, MemoryStore};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The generic actor that manages a collection of entities.
///
/// # Usage Pattern
///
/// 1.  **Create**: `ResourceActor::new()` (memory only) or `ResourceActor::with_store()`.
/// 2.  **Wire**: pass dependencies into `actor.run(context)`.
/// 3.  **Run**: spawn the run loop in a background task.
///
/// ```rust
/// use actor_framework::{ActorEntity, ResourceActor};
/// use async_trait::async_trait;
///
/// #[derive(Clone, Debug)] struct Counter { id: u32, hits: u32 }
/// #[derive(Debug)] struct NewCounter;
/// #[derive(Debug)] struct Reset;
/// #[derive(Debug)] enum CounterAction { Hit }
/// #[derive(Debug, thiserror::Error)] #[error("counter error")] struct CounterError;
///
/// #[async_trait]
/// impl ActorEntity for Counter {
///     type Id = u32;
///     type Create = NewCounter;
///     type Update = Reset;
///     type Action = CounterAction;
///     type ActionResult = u32;
///     type Context = ();
///     type Error = CounterError;
///
///     fn from_create_params(id: u32, _: NewCounter) -> Result<Self, Self::Error> {
///         Ok(Self { id, hits: 0 })
///     }
///     async fn on_update(&mut self, _: Reset, _: &()) -> Result<(), Self::Error> {
///         self.hits = 0;
///         Ok(())
///     }
///     async fn handle_action(&mut self, _: CounterAction, _: &()) -> Result<u32, Self::Error> {
///         self.hits += 1;
///         Ok(self.hits)
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let (actor, client) = ResourceActor::<Counter>::new(10);
///     tokio::spawn(actor.run(()));
///     let id = client.create(NewCounter).await.unwrap();
///     assert_eq!(client.perform_action(id, CounterAction::Hit).await.unwrap(), 1);
/// }
/// ```
pub struct ResourceActor<T: ActorEntity, S: EntityStore<T> = MemoryStore> {
    receiver: mpsc::Receiver<ResourceRequest<T>>,
    entities: HashMap<T::Id, T>,
    next_id: u32,
    store: S,
}

impl<T: ActorEntity> ResourceActor<T, MemoryStore> {
    /// Creates an actor with no durable backing, plus its client.
    ///
    /// `buffer_size` is the mpsc capacity; a full channel makes callers wait.
    pub fn new(buffer_size: usize) -> (Self, ResourceClient<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            entities: HashMap::new(),
            next_id: 1,
            store: MemoryStore,
        };
        (actor, ResourceClient::new(sender))
    }
}

impl<T: ActorEntity, S: EntityStore<T>> ResourceActor<T, S> {
    /// Creates an actor whose state is loaded from, and written through to, `store`.
    pub fn with_store(buffer_size: usize, store: S) -> Result<(Self, ResourceClient<T>), FrameworkError> {
        let snapshot = store.load()?;
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            entities: snapshot.entities.into_iter().collect(),
            next_id: snapshot.next_id.max(1),
            store,
        };
        Ok((actor, ResourceClient::new(sender)))
    }

    /// Runs the event loop until every client is dropped.
    ///
    /// `context` is handed to every entity hook, so dependencies can be created
    /// after the actor itself.
    pub async fn run(mut self, context: T::Context) {
        let entity_type = std::any::type_name::<T>()
            .split("::")
            .last()
            .unwrap_or("Unknown");
        info!(entity_type, size = self.entities.len(), "Actor started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                ResourceRequest::Create { params, respond_to } => {
                    debug!(entity_type, ?params, "Create");
                    let result = self.create(params, &context).await;
                    match &result {
                        Ok(id) => info!(entity_type, %id, size = self.entities.len(), "Created"),
                        Err(e) => warn!(entity_type, error = %e, "Create failed"),
                    }
                    let _ = respond_to.send(result);
                }
                ResourceRequest::Get { id, respond_to } => {
                    let item = self.entities.get(&id).cloned();
                    debug!(entity_type, %id, found = item.is_some(), "Get");
                    let _ = respond_to.send(Ok(item));
                }
                ResourceRequest::List { respond_to } => {
                    debug!(entity_type, size = self.entities.len(), "List");
                    let _ = respond_to.send(Ok(self.entities.values().cloned().collect()));
                }
                ResourceRequest::Update {
                    id,
                    update,
                    respond_to,
                } => {
                    debug!(entity_type, %id, ?update, "Update");
                    let result = self.update(&id, update, &context).await;
                    match &result {
                        Ok(_) => info!(entity_type, %id, "Updated"),
                        Err(e) => warn!(entity_type, %id, error = %e, "Update failed"),
                    }
                    let _ = respond_to.send(result);
                }
                ResourceRequest::Delete { id, respond_to } => {
                    debug!(entity_type, %id, "Delete");
                    let result = self.delete(&id, &context).await;
                    match &result {
                        Ok(()) => info!(entity_type, %id, size = self.entities.len(), "Deleted"),
                        Err(e) => warn!(entity_type, %id, error = %e, "Delete failed"),
                    }
                    let _ = respond_to.send(result);
                }
                ResourceRequest::Action {
                    id,
                    action,
                    respond_to,
                } => {
                    debug!(entity_type, %id, ?action, "Action");
                    let result = self.action(&id, action, &context).await;
                    match &result {
                        Ok(_) => debug!(entity_type, %id, "Action ok"),
                        Err(e) => debug!(entity_type, %id, error = %e, "Action rejected"),
                    }
                    let _ = respond_to.send(result);
                }
            }
        }

        info!(entity_type, size = self.entities.len(), "Shutdown");
    }

    async fn create(&mut self, params: T::Create, ctx: &T::Context) -> Result<T::Id, FrameworkError> {
        let id = T::Id::from(self.next_id);
        let mut item = T::from_create_params(id.clone(), params).map_err(entity_error)?;
        item.on_create(ctx).await.map_err(entity_error)?;

        let next_id = self.next_id + 1;
        self.store.put(&id, &item, next_id)?;
        self.next_id = next_id;
        self.entities.insert(id.clone(), item);
        Ok(id)
    }

    async fn update(&mut self, id: &T::Id, update: T::Update, ctx: &T::Context) -> Result<T, FrameworkError> {
        let mut draft = self
            .entities
            .get(id)
            .cloned()
            .ok_or_else(|| FrameworkError::NotFound(id.to_string()))?;
        draft.on_update(update, ctx).await.map_err(entity_error)?;

        self.store.put(id, &draft, self.next_id)?;
        self.entities.insert(id.clone(), draft.clone());
        Ok(draft)
    }

    async fn delete(&mut self, id: &T::Id, ctx: &T::Context) -> Result<(), FrameworkError> {
        let item = self
            .entities
            .get(id)
            .ok_or_else(|| FrameworkError::NotFound(id.to_string()))?;
        item.on_delete(ctx).await.map_err(entity_error)?;

        self.store.remove(id)?;
        self.entities.remove(id);
        Ok(())
    }

    async fn action(
        &mut self,
        id: &T::Id,
        action: T::Action,
        ctx: &T::Context,
    ) -> Result<T::ActionResult, FrameworkError> {
        let mut draft = self
            .entities
            .get(id)
            .cloned()
            .ok_or_else(|| FrameworkError::NotFound(id.to_string()))?;
        let result = draft.handle_action(action, ctx).await.map_err(entity_error)?;

        self.store.put(id, &draft, self.next_id)?;
        self.entities.insert(id.clone(), draft);
        Ok(result)
    }
}

fn entity_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> FrameworkError {
    FrameworkError::EntityError(Box::new(e))
}
