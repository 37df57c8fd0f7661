//! # Stock Client
//!
//! Domain API over a `ResourceClient<StockItem>`. Framework failures become
//! [`StockError`]: entity errors are unwrapped to their original variant, a
//! missing id becomes `NotFound`, and anything else (closed actor, timeout,
//! store failure) becomes `Unavailable`.
use crate::model::{ItemId, NewStockItem, SetQuantity, StockItem, StockLevel};
use crate::stock_ledger::{StockAction, StockError};
use actor_framework::{ActorClient, FrameworkError, ResourceClient};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Client for interacting with the stock ledger actor.
#[derive(Clone)]
pub struct StockClient {
    inner: ResourceClient<StockItem>,
}

impl StockClient {
    pub fn new(inner: ResourceClient<StockItem>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ActorClient<StockItem> for StockClient {
    type Error = StockError;

    fn inner(&self) -> &ResourceClient<StockItem> {
        &self.inner
    }

    fn map_error(e: FrameworkError) -> Self::Error {
        match e.downcast_entity::<StockError>() {
            Ok(stock_error) => stock_error,
            Err(FrameworkError::NotFound(id)) => StockError::NotFound(id),
            Err(other) => StockError::Unavailable(other.to_string()),
        }
    }
}

impl StockClient {
    #[instrument(skip(self))]
    pub async fn create_item(&self, params: NewStockItem) -> Result<ItemId, StockError> {
        debug!("Sending request");
        self.inner.create(params).await.map_err(Self::map_error)
    }

    /// Absolute quantity set; returns the stored record.
    #[instrument(skip(self))]
    pub async fn set_quantity(&self, id: ItemId, quantity: u32) -> Result<StockItem, StockError> {
        self.inner
            .update(id, SetQuantity { quantity })
            .await
            .map_err(Self::map_error)
    }

    #[instrument(skip(self))]
    pub async fn decrement(
        &self,
        id: ItemId,
        amount: u32,
        expected_version: u64,
    ) -> Result<StockLevel, StockError> {
        debug!(%id, amount, expected_version, "Decrementing stock");
        self.inner
            .perform_action(
                id,
                StockAction::Decrement {
                    amount,
                    expected_version,
                },
            )
            .await
            .map_err(Self::map_error)
    }

    #[instrument(skip(self))]
    pub async fn restock(&self, id: ItemId, amount: u32) -> Result<StockLevel, StockError> {
        debug!(%id, amount, "Restocking");
        self.inner
            .perform_action(id, StockAction::Restock { amount })
            .await
            .map_err(Self::map_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actor_framework::mock::{create_mock_client, expect_action, MockClient};
    use std::time::Duration;

    #[tokio::test]
    async fn test_decrement_sends_cas_action() {
        let (client, mut receiver) = create_mock_client::<StockItem>(10);
        let stock_client = StockClient::new(client);

        let task = tokio::spawn(async move { stock_client.decrement(ItemId(42), 3, 2).await });

        let (id, action, responder) = expect_action(&mut receiver)
            .await
            .expect("Expected Action request");
        assert_eq!(id, ItemId(42));
        assert!(matches!(
            action,
            StockAction::Decrement {
                amount: 3,
                expected_version: 2
            }
        ));
        responder
            .send(Ok(StockLevel {
                remaining: 7,
                version: 3,
            }))
            .unwrap();

        let level = task.await.unwrap().unwrap();
        assert_eq!(level.remaining, 7);
    }

    #[tokio::test]
    async fn test_entity_error_keeps_its_variant() {
        let (client, mut receiver) = create_mock_client::<StockItem>(10);
        let stock_client = StockClient::new(client);

        let task = tokio::spawn(async move { stock_client.decrement(ItemId(1), 3, 1).await });

        let (_, _, responder) = expect_action(&mut receiver).await.unwrap();
        responder
            .send(Err(FrameworkError::EntityError(Box::new(
                StockError::VersionConflict {
                    expected: 1,
                    current: 2,
                },
            ))))
            .unwrap();

        assert_eq!(
            task.await.unwrap().unwrap_err(),
            StockError::VersionConflict {
                expected: 1,
                current: 2
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let mut mock = MockClient::<StockItem>::new();
        mock.expect_action(ItemId(9))
            .return_err(FrameworkError::Timeout(Duration::from_secs(5)));

        let err = StockClient::new(mock.client())
            .restock(ItemId(9), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::Unavailable(_)));
        mock.verify();
    }
}
