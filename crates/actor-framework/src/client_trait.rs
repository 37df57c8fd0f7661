//! Shared reads and deletes for typed clients.
use crate::{ActorEntity, FrameworkError, ResourceClient};
use async_trait::async_trait;

/// A typed client wraps a [`ResourceClient`] and translates
/// [`FrameworkError`] into its resource's error enum. Implement
/// [`inner`](ActorClient::inner) and [`map_error`](ActorClient::map_error);
/// `get`, `list` and `delete` come with it.
#[async_trait]
pub trait ActorClient<T: ActorEntity>: Send + Sync {
    type Error: Send + Sync;

    fn inner(&self) -> &ResourceClient<T>;

    fn map_error(e: FrameworkError) -> Self::Error;

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: T::Id) -> Result<Option<T>, Self::Error> {
        self.inner().get(id).await.map_err(Self::map_error)
    }

    async fn list(&self) -> Result<Vec<T>, Self::Error> {
        self.inner().list().await.map_err(Self::map_error)
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: T::Id) -> Result<(), Self::Error> {
        self.inner().delete(id).await.map_err(Self::map_error)
    }
}
