//! A line in the inventory, owned by the stock ledger.
//!
//! Implements [`ActorEntity`](actor_framework::ActorEntity) in
//! [`stock_ledger::entity`](crate::stock_ledger::entity); every mutation bumps
//! `version`, which callers echo back for compare-and-swap decrements.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Type-safe identifier for stock items. Positive, assigned by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u32);

impl From<u32> for ItemId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<u32>() {
            Ok(0) | Err(_) => Err(format!("invalid item id: {s:?}")),
            Ok(n) => Ok(Self(n)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: ItemId,
    pub name: String,
    pub quantity: u32,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl StockItem {
    pub fn new(id: ItemId, name: impl Into<String>, quantity: u32) -> Self {
        Self {
            id,
            name: name.into(),
            quantity,
            version: 1,
            updated_at: Utc::now(),
        }
    }
}

/// `POST /items` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStockItem {
    pub name: String,
    pub quantity: u32,
}

/// `PUT /items/{id}` body: absolute quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetQuantity {
    pub quantity: u32,
}

/// `PATCH /items/{id}/deduct` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductRequest {
    pub quantity: u32,
    pub version: u64,
}

/// Quantity and version after a successful ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub remaining: u32,
    pub version: u64,
}
