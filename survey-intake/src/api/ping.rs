//! Liveness probe

use axum::{routing::get, Json, Router};
use serde::Serialize;
use survey_common::time;

use crate::AppState;

/// Ping response: status, fixed message, current UTC time
#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: String,
    pub message: String,
    pub utc_time: String,
}

/// GET /ping
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok".to_string(),
        message: "API is alive".to_string(),
        utc_time: time::now().to_rfc3339(),
    })
}

/// Build ping routes
pub fn ping_routes() -> Router<AppState> {
    Router::new().route("/ping", get(ping))
}
