//! Typed clients over the generic `ResourceClient`s.

pub mod order_client;
pub mod stock_client;

pub use actor_framework::ActorClient;
pub use order_client::OrderClient;
pub use stock_client::StockClient;
