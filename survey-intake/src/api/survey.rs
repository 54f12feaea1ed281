//! Survey submission endpoint
//!
//! POST /v1/survey runs the whole pipeline for one request:
//! content-type gate → JSON parse → validate → enrich → append.
//! Nothing touches the store until validation has passed.

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Method, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::enricher::{enrich, RequestMeta};
use crate::error::{ApiError, ApiResult};
use crate::submission::{validate, ValidationError};
use crate::AppState;

/// Header carrying the originating client address behind a proxy
pub const FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// POST /v1/survey
///
/// 201 on success, 400 for unparseable or non-object bodies, 422 for schema violations,
/// 5xx when the store rejects the append.
pub async fn submit_survey(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<StatusResponse>)> {
    if !is_json_content_type(&headers) {
        return Err(ApiError::InvalidJson(
            "Body must be application/json".to_string(),
        ));
    }

    let raw: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidJson(format!("Body is not valid JSON: {}", e)))?;

    let submission = validate(raw).map_err(|e| match e {
        ValidationError::NotAnObject(_) => ApiError::InvalidJson(e.to_string()),
        ValidationError::Fields(errors) => {
            debug!(errors = errors.len(), "Rejected survey submission");
            ApiError::Validation(errors)
        }
    })?;

    let meta = request_meta(&headers, peer.map(|ConnectInfo(addr)| addr));

    // received_at is taken under the store lock so it follows append order
    let record = state
        .store
        .append_with(move |now| enrich(submission, &meta, now))
        .await?;

    info!(
        submission_id = record.submission_id(),
        received_at = %record.received_at(),
        "Stored survey submission"
    );

    Ok((
        StatusCode::CREATED,
        Json(StatusResponse {
            status: "ok".to_string(),
        }),
    ))
}

/// Collect the request facts the enricher needs
pub fn request_meta(headers: &HeaderMap, peer: Option<SocketAddr>) -> RequestMeta {
    let header_string = |name: &str| headers.get(name).map(|v| decode_latin1(v.as_bytes()));

    RequestMeta {
        user_agent: header_string(header::USER_AGENT.as_str()),
        forwarded_for: header_string(FORWARDED_FOR),
        peer_ip: peer.map(|addr| addr.ip()),
    }
}

/// Header bytes read as ISO-8859-1, so no value is lost to a decoding failure
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// `application/json` or any `+json` media type, parameters ignored
fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

/// Build versioned API routes, optionally open to any origin
pub fn survey_routes(cors_allow_any_origin: bool) -> Router<AppState> {
    let routes = Router::new().route("/v1/survey", post(submit_survey));

    if cors_allow_any_origin {
        routes.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
    } else {
        routes
    }
}
