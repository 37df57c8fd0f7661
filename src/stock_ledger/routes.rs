//! HTTP surface of the stock ledger.

use super::StockLedger;
use crate::error::{AppError, AppResult};
use crate::health::HealthReport;
use crate::metrics::LedgerSnapshot;
use crate::model::{DeductRequest, ItemId, NewStockItem, SetQuantity, StockItem, StockLevel};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

pub fn router(ledger: StockLedger) -> Router {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route(
            "/items/{id}",
            get(get_item).put(set_quantity).delete(delete_item),
        )
        .route("/items/{id}/deduct", patch(deduct))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(ledger)
}

fn parse_id(raw: &str) -> AppResult<ItemId> {
    raw.parse().map_err(AppError::Validation)
}

async fn list_items(State(ledger): State<StockLedger>) -> AppResult<Json<Vec<StockItem>>> {
    Ok(Json(ledger.list().await?))
}

async fn get_item(State(ledger): State<StockLedger>, Path(id): Path<String>) -> AppResult<Json<StockItem>> {
    Ok(Json(ledger.get(parse_id(&id)?).await?))
}

async fn create_item(
    State(ledger): State<StockLedger>,
    body: Result<Json<NewStockItem>, JsonRejection>,
) -> AppResult<(StatusCode, Json<StockItem>)> {
    let Json(params) = body?;
    let item = ledger.create(params).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn set_quantity(
    State(ledger): State<StockLedger>,
    Path(id): Path<String>,
    body: Result<Json<SetQuantity>, JsonRejection>,
) -> AppResult<Json<StockItem>> {
    let id = parse_id(&id)?;
    let Json(update) = body?;
    Ok(Json(ledger.set_quantity(id, update.quantity).await?))
}

async fn delete_item(State(ledger): State<StockLedger>, Path(id): Path<String>) -> AppResult<StatusCode> {
    ledger.delete(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn deduct(
    State(ledger): State<StockLedger>,
    Path(id): Path<String>,
    body: Result<Json<DeductRequest>, JsonRejection>,
) -> AppResult<Json<StockLevel>> {
    let id = parse_id(&id)?;
    let Json(req) = body?;
    Ok(Json(ledger.decrement(id, req.quantity, req.version).await?))
}

async fn health(State(ledger): State<StockLedger>) -> HealthReport {
    let mut report = HealthReport::new("stock-ledger");
    report.check("store", ledger.list().await.is_ok());
    report.check("cache", ledger.cache().ping().await.is_ok());
    report
}

async fn metrics(State(ledger): State<StockLedger>) -> Json<LedgerSnapshot> {
    Json(ledger.metrics().snapshot())
}
