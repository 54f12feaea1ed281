//! survey-intake library - Survey submission intake service
//!
//! Accepts survey submissions over HTTP, validates them, replaces PII with one-way hashes,
//! assigns a deterministic identifier when the client sent none, and appends each record to
//! an append-only JSON-lines store.
//!
//! Pipeline (each stage produces a new value):
//! `serde_json::Value` → [`submission::SurveySubmission`] → [`record::StoredSurveyRecord`] → store line

use axum::extract::DefaultBodyLimit;
use axum::Router;
use survey_common::config::ServiceConfig;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod enricher;
pub mod error;
pub mod identifier;
pub mod record;
pub mod storage;
pub mod submission;

pub use crate::error::{ApiError, ApiResult};
pub use crate::storage::{JsonlStore, StorageError};

/// Default cap on request bodies when no configuration is supplied
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Append-only submission store (the only shared mutable resource)
    pub store: JsonlStore,
    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
    /// Open `/v1/*` to cross-origin requests from any origin
    pub cors_allow_any_origin: bool,
}

impl AppState {
    /// Create state with default HTTP limits
    pub fn new(store: JsonlStore) -> Self {
        Self {
            store,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cors_allow_any_origin: true,
        }
    }

    /// Create state using the HTTP settings from the loaded configuration
    pub fn from_config(store: JsonlStore, config: &ServiceConfig) -> Self {
        Self {
            store,
            max_body_bytes: config.max_body_bytes,
            cors_allow_any_origin: config.cors_allow_any_origin,
        }
    }
}

/// Build application router
///
/// - `POST /v1/survey`: submission intake (CORS-enabled when configured)
/// - `GET /ping`: liveness probe
/// - `GET /buildinfo`: build identification
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::survey_routes(state.cors_allow_any_origin))
        .merge(api::ping_routes())
        .merge(api::buildinfo_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(state.max_body_bytes)),
        )
        .with_state(state)
}
