//! [`ActorEntity`] implementation for [`StockItem`].

use super::actions::StockAction;
use super::error::StockError;
use crate::model::{ItemId, NewStockItem, SetQuantity, StockItem, StockLevel};
use actor_framework::ActorEntity;
use async_trait::async_trait;
use chrono::Utc;

#[async_trait]
impl ActorEntity for StockItem {
    type Id = ItemId;
    type Create = NewStockItem;
    type Update = SetQuantity;
    type Action = StockAction;
    type ActionResult = StockLevel;
    type Context = ();
    type Error = StockError;

    fn from_create_params(id: ItemId, params: NewStockItem) -> Result<Self, Self::Error> {
        let name = params.name.trim();
        if name.is_empty() {
            return Err(StockError::Validation("name must not be empty".into()));
        }
        Ok(Self::new(id, name, params.quantity))
    }

    /// Absolute set. Counts as a write, so the version moves.
    async fn on_update(&mut self, update: SetQuantity, _ctx: &()) -> Result<(), Self::Error> {
        self.quantity = update.quantity;
        self.touch();
        Ok(())
    }

    async fn handle_action(&mut self, action: StockAction, _ctx: &()) -> Result<StockLevel, Self::Error> {
        match action {
            StockAction::Decrement {
                amount,
                expected_version,
            } => {
                if amount == 0 {
                    return Err(StockError::Validation("quantity must be positive".into()));
                }
                if self.version != expected_version {
                    return Err(StockError::VersionConflict {
                        expected: expected_version,
                        current: self.version,
                    });
                }
                if self.quantity < amount {
                    return Err(StockError::InsufficientStock {
                        requested: amount,
                        available: self.quantity,
                    });
                }
                self.quantity -= amount;
                self.touch();
            }
            StockAction::Restock { amount } => {
                self.quantity = self
                    .quantity
                    .checked_add(amount)
                    .ok_or_else(|| StockError::Validation("restock overflows quantity".into()))?;
                self.touch();
            }
        }
        Ok(StockLevel {
            remaining: self.quantity,
            version: self.version,
        })
    }
}

impl StockItem {
    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
