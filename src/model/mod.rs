//! Domain types shared across the pipeline.

pub mod notification;
pub mod order;
pub mod stock;

pub use notification::*;
pub use order::*;
pub use stock::*;
