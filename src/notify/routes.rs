//! HTTP and WebSocket surface of the notification relay.

use super::bus::StatusBus;
use super::error::RelayError;
use super::relay::NotificationRelay;
use super::socket;
use crate::error::AppResult;
use crate::health::HealthReport;
use crate::metrics::RelaySnapshot;
use crate::model::{NotifyRequest, StatusEvent};
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::time::Duration;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct RelayState {
    pub relay: NotificationRelay,
    pub bus: StatusBus,
    pub register_timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub student_id: String,
    pub notifications: Vec<StatusEvent>,
}

#[derive(Debug, Serialize)]
struct Dispatched {
    message: &'static str,
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/ws", get(upgrade))
        .route("/notify", post(notify))
        .route("/notify/history/{student_id}", get(history))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| socket::serve(socket, state.relay, state.register_timeout))
}

async fn notify(
    State(state): State<RelayState>,
    body: Result<Json<NotifyRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Dispatched>)> {
    let Json(request) = body?;
    if request.student_id.trim().is_empty() || request.order_id.trim().is_empty() {
        return Err(RelayError::Validation("studentId and orderId are required".into()).into());
    }

    let event = StatusEvent::now(request.order_id, request.student_id, request.status, request.detail);
    state.bus.publish(event);
    Ok((
        StatusCode::ACCEPTED,
        Json(Dispatched {
            message: "Notification dispatched",
        }),
    ))
}

async fn history(
    State(state): State<RelayState>,
    Path(student_id): Path<String>,
) -> AppResult<Json<HistoryResponse>> {
    let notifications = state.relay.history(&student_id).await?;
    Ok(Json(HistoryResponse {
        student_id,
        notifications,
    }))
}

async fn health(State(state): State<RelayState>) -> HealthReport {
    let mut report = HealthReport::new("notification-relay");
    report.check("relay", state.relay.active_connections().await.is_ok());
    report
}

/// JSON by default, Prometheus text when the client asks for `text/plain`.
async fn metrics(State(state): State<RelayState>, headers: HeaderMap) -> Response {
    let wants_text = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/plain"));

    let metrics = state.relay.metrics();
    if wants_text {
        (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics.render_prometheus(),
        )
            .into_response()
    } else {
        Json::<RelaySnapshot>(metrics.snapshot()).into_response()
    }
}
