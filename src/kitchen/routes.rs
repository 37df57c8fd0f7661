//! HTTP surface of the cooking worker.

use super::IdempotencyStore;
use crate::broker::{Broker, DeadLetter, QueueDepth};
use crate::error::{AppError, AppResult};
use crate::health::HealthReport;
use crate::metrics::{BrokerSnapshot, KitchenMetrics, KitchenSnapshot};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct KitchenState {
    pub broker: Broker,
    pub idempotency: IdempotencyStore,
    pub metrics: Arc<KitchenMetrics>,
}

#[derive(Debug, Serialize)]
pub struct KitchenReport {
    #[serde(flatten)]
    pub kitchen: KitchenSnapshot,
    pub broker: BrokerSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueDepth>,
}

pub fn router(state: KitchenState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/dead-letters", get(dead_letters))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<KitchenState>) -> HealthReport {
    let mut report = HealthReport::new("kitchen");
    report
        .check("broker", state.broker.depth().await.is_ok())
        .check("idempotency", state.idempotency.is_healthy().await);
    report
}

async fn metrics(State(state): State<KitchenState>) -> Json<KitchenReport> {
    Json(KitchenReport {
        kitchen: state.metrics.snapshot(),
        broker: state.broker.metrics().snapshot(),
        queue: state.broker.depth().await.ok(),
    })
}

async fn dead_letters(State(state): State<KitchenState>) -> AppResult<Json<Vec<DeadLetter>>> {
    state
        .broker
        .dead_letters()
        .await
        .map(Json)
        .map_err(|e| AppError::DependencyUnavailable(e.to_string()))
}
