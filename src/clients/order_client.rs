//! # Order Client
//!
//! Domain API over a `ResourceClient<Order>`.
use crate::model::{NewOrder, Order, OrderId, OrderStatus};
use crate::orders::{OrderAction, OrderError};
use actor_framework::{ActorClient, FrameworkError, ResourceClient};
use async_trait::async_trait;
use tracing::instrument;

#[derive(Clone)]
pub struct OrderClient {
    inner: ResourceClient<Order>,
}

impl OrderClient {
    pub fn new(inner: ResourceClient<Order>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ActorClient<Order> for OrderClient {
    type Error = OrderError;

    fn inner(&self) -> &ResourceClient<Order> {
        &self.inner
    }

    fn map_error(e: FrameworkError) -> Self::Error {
        match e.downcast_entity::<OrderError>() {
            Ok(order_error) => order_error,
            Err(FrameworkError::NotFound(id)) => OrderError::NotFound(id),
            Err(other) => OrderError::Unavailable(other.to_string()),
        }
    }
}

impl OrderClient {
    #[instrument(skip(self))]
    pub async fn create_order(&self, params: NewOrder) -> Result<OrderId, OrderError> {
        self.inner.create(params).await.map_err(Self::map_error)
    }

    #[instrument(skip(self))]
    pub async fn advance(
        &self,
        id: OrderId,
        status: OrderStatus,
        detail: Option<String>,
    ) -> Result<Order, OrderError> {
        self.inner
            .perform_action(id, OrderAction::Advance { status, detail })
            .await
            .map_err(Self::map_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actor_framework::mock::{create_mock_client, expect_action};

    #[tokio::test]
    async fn test_advance_sends_target_status() {
        let (client, mut receiver) = create_mock_client::<Order>(4);
        let orders = OrderClient::new(client);

        let task = tokio::spawn(async move {
            orders
                .advance(OrderId(7), OrderStatus::InKitchen, None)
                .await
        });

        let (id, action, responder) = expect_action(&mut receiver).await.unwrap();
        assert_eq!(id, OrderId(7));
        assert!(matches!(
            action,
            OrderAction::Advance {
                status: OrderStatus::InKitchen,
                ..
            }
        ));
        responder
            .send(Err(FrameworkError::EntityError(Box::new(
                OrderError::InvalidTransition {
                    from: OrderStatus::Failed,
                    to: OrderStatus::InKitchen,
                },
            ))))
            .unwrap();

        assert!(matches!(
            task.await.unwrap(),
            Err(OrderError::InvalidTransition { .. })
        ));
    }
}
