//! Router wrapper for integration tests
//!
//! Each TestApp owns its own temporary directory, so tests never share a store file.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use survey_intake::{build_router, AppState, JsonlStore};
use tempfile::TempDir;
use tower::ServiceExt;

/// Peer address attached to every request built by [`json_request`]
pub const TEST_PEER: &str = "192.0.2.10:54321";

/// Append bound used unless a test asks for another
pub const DEFAULT_APPEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestApp {
    router: Router,
    store: JsonlStore,
    store_path: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    /// Router with default HTTP settings and a fresh store
    pub fn new() -> Self {
        Self::with_state(AppState::new)
    }

    /// Router whose state is customised by `configure`
    pub fn with_state(configure: impl FnOnce(JsonlStore) -> AppState) -> Self {
        Self::build(DEFAULT_APPEND_TIMEOUT, configure)
    }

    /// Default router over a store with the given append bound
    pub fn with_append_timeout(append_timeout: Duration) -> Self {
        Self::build(append_timeout, AppState::new)
    }

    fn build(append_timeout: Duration, configure: impl FnOnce(JsonlStore) -> AppState) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store_path = dir.path().join("survey.ndjson");
        let store = JsonlStore::open(&store_path, append_timeout).expect("open store");

        Self {
            router: build_router(configure(store.clone())),
            store,
            store_path,
            _dir: dir,
        }
    }

    /// Handle to the same store the router writes to
    pub fn store(&self) -> JsonlStore {
        self.store.clone()
    }

    /// Clone of the router, for spawning concurrent requests
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn store_path(&self) -> &PathBuf {
        &self.store_path
    }

    /// Send one request through a clone of the router
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Raw store lines (without terminators)
    pub fn store_lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.store_path)
            .expect("read store")
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Store lines parsed as JSON objects
    pub fn stored_records(&self) -> Vec<Value> {
        self.store_lines()
            .iter()
            .map(|line| serde_json::from_str(line).expect("each line is a JSON object"))
            .collect()
    }

    pub fn store_len(&self) -> u64 {
        std::fs::metadata(&self.store_path).expect("store metadata").len()
    }
}

/// POST builder with JSON content type, a user agent and a peer address
pub fn json_request(uri: &str, body: impl Into<Body>) -> Request<Body> {
    let peer: SocketAddr = TEST_PEER.parse().expect("valid peer");
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "survey-tests/1.0")
        .extension(ConnectInfo(peer))
        .body(body.into())
        .expect("valid request")
}

/// Extract JSON body from response
pub async fn extract_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("response body is JSON")
}
