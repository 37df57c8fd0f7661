//! HTTP surface of the order gateway.

use super::auth::{bearer_token, Claims, IdentityVerifier};
use super::service::{OrderAccepted, OrderGateway, OrderRequest};
use crate::error::{AppError, AppResult};
use crate::health::HealthReport;
use crate::model::{Order, OrderId};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, Request, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct GatewayState {
    pub gateway: OrderGateway,
    pub verifier: Arc<dyn IdentityVerifier>,
}

/// A request that carried a valid bearer token.
#[derive(Debug, Clone)]
pub struct Student(pub Claims);

impl FromRequestParts<GatewayState> for Student {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &GatewayState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let claims = bearer_token(header).and_then(|token| state.verifier.verify(token));
        match claims {
            Ok(claims) => Ok(Student(claims)),
            Err(e) => {
                state.gateway.metrics().auth_failure();
                Err(e.into())
            }
        }
    }
}

pub fn router(state: GatewayState) -> Router {
    let orders = Router::new()
        .route("/orders", post(place_order))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_order_request));

    Router::new()
        .merge(orders)
        .route("/orders/{id}", get(get_order))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Request count, outcome and latency for `POST /orders`.
async fn track_order_request(State(state): State<GatewayState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    let accepted = response.status().is_success();
    state
        .gateway
        .metrics()
        .observe(accepted, started.elapsed().as_millis() as u64);
    response
}

async fn place_order(
    State(state): State<GatewayState>,
    Student(claims): Student,
    body: Result<Json<OrderRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<OrderAccepted>)> {
    let Json(request) = body?;
    let accepted = state.gateway.accept_order(&claims.sub, request).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn get_order(
    State(state): State<GatewayState>,
    Student(claims): Student,
    Path(raw): Path<String>,
) -> AppResult<Json<Order>> {
    let id: OrderId = raw.parse().map_err(AppError::Validation)?;
    Ok(Json(state.gateway.order_for(&claims.sub, id).await?))
}

async fn health(State(state): State<GatewayState>) -> HealthReport {
    let gateway = &state.gateway;
    let mut report = HealthReport::new("gateway");
    report
        .check("cache", gateway.cache().ping().await.is_ok())
        .check("stock_ledger", gateway.ledger().list().await.is_ok())
        .check("broker", gateway.broker().depth().await.is_ok());
    report
}

async fn metrics(State(state): State<GatewayState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.gateway.metrics().render_prometheus(),
    )
        .into_response()
}
