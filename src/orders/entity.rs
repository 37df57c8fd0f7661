use super::actions::OrderAction;
use super::error::OrderError;
use crate::model::{NewOrder, Order, OrderId, OrderStatus};
use actor_framework::ActorEntity;
use async_trait::async_trait;
use chrono::Utc;

#[async_trait]
impl ActorEntity for Order {
    type Id = OrderId;
    type Create = NewOrder;
    type Update = ();
    type Action = OrderAction;
    type ActionResult = Order;
    type Context = ();
    type Error = OrderError;

    fn from_create_params(id: OrderId, params: NewOrder) -> Result<Self, Self::Error> {
        if params.student_id.trim().is_empty() {
            return Err(OrderError::Validation("studentId is required".into()));
        }
        if params.items.is_empty() || params.items.iter().any(|line| line.quantity == 0) {
            return Err(OrderError::Validation("at least one item with a positive quantity".into()));
        }
        let now = Utc::now();
        Ok(Self {
            id,
            student_id: params.student_id,
            items: params.items,
            status: OrderStatus::Pending,
            detail: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Records change only through `Advance`.
    async fn on_update(&mut self, _update: (), _ctx: &()) -> Result<(), Self::Error> {
        Err(OrderError::Validation("orders are updated through status transitions".into()))
    }

    async fn handle_action(&mut self, action: OrderAction, _ctx: &()) -> Result<Order, Self::Error> {
        match action {
            OrderAction::Advance { status, detail } => {
                if status == self.status {
                    return Ok(self.clone());
                }
                if !self.status.can_advance_to(status) {
                    return Err(OrderError::InvalidTransition {
                        from: self.status,
                        to: status,
                    });
                }
                self.status = status;
                if detail.is_some() {
                    self.detail = detail;
                }
                self.updated_at = Utc::now();
                Ok(self.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemId, OrderLine};

    fn order() -> Order {
        Order::from_create_params(
            OrderId(1),
            NewOrder {
                student_id: "S1".into(),
                items: vec![OrderLine {
                    item_id: ItemId(3),
                    quantity: 1,
                }],
            },
        )
        .unwrap()
    }

    fn advance(status: OrderStatus) -> OrderAction {
        OrderAction::Advance { status, detail: None }
    }

    #[tokio::test]
    async fn test_happy_path_to_ready() {
        let mut o = order();
        for status in [OrderStatus::StockVerified, OrderStatus::InKitchen, OrderStatus::Ready] {
            assert_eq!(o.handle_action(advance(status), &()).await.unwrap().status, status);
        }
    }

    #[tokio::test]
    async fn test_terminal_states_stick() {
        let mut o = order();
        o.handle_action(advance(OrderStatus::Failed), &()).await.unwrap();
        let err = o
            .handle_action(advance(OrderStatus::InKitchen), &())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Failed,
                to: OrderStatus::InKitchen
            }
        );
    }

    #[tokio::test]
    async fn test_repeat_is_noop() {
        let mut o = order();
        o.handle_action(advance(OrderStatus::StockVerified), &()).await.unwrap();
        let again = o
            .handle_action(advance(OrderStatus::StockVerified), &())
            .await
            .unwrap();
        assert_eq!(again.status, OrderStatus::StockVerified);
    }
}
