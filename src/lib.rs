//! # Cafeteria Pipeline
//!
//! A campus cafeteria ordering pipeline built from resource actors.
//!
//! A student's order flows through five components, each with its own HTTP
//! surface:
//!
//! 1. [`gateway`]: authenticates the student, reserves stock, records the
//!    order and queues it. Answers immediately with accept or reject.
//! 2. [`stock_ledger`]: the single source of truth for quantities. Decrements
//!    are compare-and-swap on the item version; reads go through a
//!    cache-aside layer.
//! 3. [`broker`]: a durable work queue with delayed retries and a
//!    dead-letter queue.
//! 4. [`kitchen`]: the cooking worker. Claims each order exactly once,
//!    cooks it, and reports progress.
//! 5. [`notify`]: the notification relay. Pushes status changes to the
//!    student's WebSocket and keeps a short history for catch-up.
//!
//! The stock ledger and order store are `actor_framework::ResourceActor`s
//! persisted with redb; the remaining components are bespoke actors in the
//! same style. [`lifecycle::CafeteriaSystem`] wires everything together.
//!
//! ## Quick start
//!
//! ```ignore
//! let system = CafeteriaSystem::start(PipelineConfig::from_env()).await?;
//! let app = system.gateway_router();
//! // serve `app`, then:
//! system.shutdown().await?;
//! ```

pub mod broker;
pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod kitchen;
pub mod lifecycle;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod orders;
pub mod stock_ledger;

pub use config::PipelineConfig;
pub use error::{AppError, AppResult};
pub use lifecycle::CafeteriaSystem;
