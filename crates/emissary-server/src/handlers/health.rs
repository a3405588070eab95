use std::collections::BTreeMap;

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub checks: BTreeMap<String, String>,
}

impl HealthResponse {
    fn up() -> Self {
        Self {
            status: "UP".to_string(),
            checks: BTreeMap::new(),
        }
    }
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self::up()
    }
}

/// GET /alive: the process answers.
pub async fn alive() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// GET /health: the cache worker is serving.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let worker = state.worker().state();

    let mut response = HealthResponse::up();
    response
        .checks
        .insert("cacheWorker".to_string(), worker.to_string());

    if worker.is_serving() {
        (StatusCode::OK, Json(response))
    } else {
        response.status = "DOWN".to_string();
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}
