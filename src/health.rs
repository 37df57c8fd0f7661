//! `GET /health` response shared by every service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-dependency up/down report; 200 when everything is up, 503 otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub service: &'static str,
    pub status: &'static str,
    pub checks: BTreeMap<&'static str, &'static str>,
}

impl HealthReport {
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            status: "ok",
            checks: BTreeMap::new(),
        }
    }

    pub fn check(&mut self, dependency: &'static str, up: bool) -> &mut Self {
        self.checks.insert(dependency, if up { "up" } else { "down" });
        if !up {
            self.status = "degraded";
        }
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "ok"
    }
}

impl IntoResponse for HealthReport {
    fn into_response(self) -> Response {
        let status = if self.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(self)).into_response()
    }
}
