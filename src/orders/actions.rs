use crate::model::OrderStatus;

#[derive(Debug, Clone)]
pub enum OrderAction {
    /// Move the order to `status`. Re-applying the current status is a no-op.
    Advance {
        status: OrderStatus,
        detail: Option<String>,
    },
}
