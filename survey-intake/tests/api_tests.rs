//! Integration tests for survey-intake HTTP endpoints
//!
//! Tests cover:
//! - GET /ping liveness probe and GET /buildinfo
//! - POST /v1/survey success path and stored record contents
//! - 400 / 422 rejections and their lack of side effects
//! - 5xx when the store cannot be written or does not answer in time
//! - Append ordering under sequential and concurrent load
//! - CORS and body size limits

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{DateTime, Utc};
use helpers::{extract_json, json_request, TestApp};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use survey_common::{sha256_hex, time};
use survey_intake::identifier::derive_submission_id;
use survey_intake::AppState;
use tower::ServiceExt;

// =============================================================================
// Ping
// =============================================================================

#[tokio::test]
async fn test_ping() {
    let app = TestApp::new();

    let request = Request::builder().uri("/ping").body(Body::empty()).unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "API is alive");
    let utc_time = body["utc_time"].as_str().unwrap();
    assert!(DateTime::parse_from_rfc3339(utc_time).is_ok());
}

#[tokio::test]
async fn test_buildinfo() {
    let app = TestApp::new();

    let request = Request::builder()
        .uri("/buildinfo")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response).await;
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(!body["git_hash"].as_str().unwrap().is_empty());
    assert!(DateTime::parse_from_rfc3339(body["build_timestamp"].as_str().unwrap()).is_ok());
    assert!(!body["build_profile"].as_str().unwrap().is_empty());
}

// =============================================================================
// Successful submissions
// =============================================================================

#[tokio::test]
async fn test_submission_stored_with_hashed_pii() {
    let app = TestApp::new();

    let before = time::now();
    let response = app
        .send(json_request(
            "/v1/survey",
            json!({"email": "a@example.com", "age": 30, "rating": 5}).to_string(),
        ))
        .await;
    let after = time::now();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(extract_json(response).await, json!({"status": "ok"}));

    let records = app.stored_records();
    assert_eq!(records.len(), 1);
    let record = &records[0];

    assert_eq!(record["email"], sha256_hex("a@example.com"));
    assert_eq!(record["age"], sha256_hex("30"));
    assert_eq!(record["rating"], 5);
    assert_eq!(record["ip"], "192.0.2.10");
    assert_eq!(record["user_agent"], "survey-tests/1.0");

    // Derived from the raw email and the hour bucket of the request
    let expected_ids = [
        derive_submission_id("a@example.com", before),
        derive_submission_id("a@example.com", after),
    ];
    assert!(expected_ids.contains(&record["submission_id"].as_str().unwrap().to_string()));

    let received_at: DateTime<Utc> = record["received_at"].as_str().unwrap().parse().unwrap();
    assert!(received_at >= before && received_at <= after);
}

#[tokio::test]
async fn test_store_never_contains_raw_pii() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            "/v1/survey",
            json!({"email": "private.person@example.org", "age": 63}).to_string(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let contents = std::fs::read_to_string(app.store_path()).unwrap();
    assert!(!contents.contains("private.person@example.org"));
    assert!(!contents.contains("\"age\":63"));
}

#[tokio::test]
async fn test_caller_submission_id_passes_through() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            "/v1/survey",
            json!({"email": "a@example.com", "age": 30, "submission_id": "client-abc-1"})
                .to_string(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let records = app.stored_records();
    assert_eq!(records[0]["submission_id"], "client-abc-1");
}

#[tokio::test]
async fn test_forwarded_for_preferred_over_peer() {
    let app = TestApp::new();

    let mut request = json_request(
        "/v1/survey",
        json!({"email": "a@example.com", "age": 30}).to_string(),
    );
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.50".parse().unwrap());

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(app.stored_records()[0]["ip"], "203.0.113.50");
}

#[tokio::test]
async fn test_missing_metadata_stored_as_empty_strings() {
    let app = TestApp::new();

    let request = Request::builder()
        .method("POST")
        .uri("/v1/survey")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"email": "a@example.com", "age": 30}).to_string()))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let record = &app.stored_records()[0];
    assert_eq!(record["ip"], "");
    assert_eq!(record["user_agent"], "");
}

#[tokio::test]
async fn test_sequential_submissions_append_in_order() {
    let app = TestApp::new();

    for i in 0..10 {
        let response = app
            .send(json_request(
                "/v1/survey",
                json!({"email": "a@example.com", "age": 30, "submission_id": format!("s-{i}")})
                    .to_string(),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let ids: Vec<String> = app
        .stored_records()
        .iter()
        .map(|r| r["submission_id"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..10).map(|i| format!("s-{i}")).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_duplicate_derived_ids_are_each_appended() {
    let app = TestApp::new();

    for _ in 0..2 {
        let response = app
            .send(json_request(
                "/v1/survey",
                json!({"email": "same@example.com", "age": 30}).to_string(),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    assert_eq!(app.stored_records().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_never_interleave() {
    let app = TestApp::new();
    let count = 32;

    let mut handles = Vec::new();
    for i in 0..count {
        let router = app.router();
        handles.push(tokio::spawn(async move {
            let body = json!({
                "email": format!("user{i}@example.com"),
                "age": 30,
                "submission_id": format!("c-{i}"),
                "comments": "x".repeat(2048),
            });
            router
                .oneshot(json_request("/v1/survey", body.to_string()))
                .await
                .unwrap()
                .status()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::CREATED);
    }

    let records = app.stored_records();
    assert_eq!(records.len(), count);
    let ids: HashSet<String> = records
        .iter()
        .map(|r| r["submission_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), count);

    // Stamps follow file order even though requests raced for the store
    let stamps: Vec<DateTime<Utc>> = records
        .iter()
        .map(|r| r["received_at"].as_str().unwrap().parse().unwrap())
        .collect();
    assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_missing_email_is_422() {
    let app = TestApp::new();

    let response = app
        .send(json_request("/v1/survey", json!({"age": 30}).to_string()))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = extract_json(response).await;
    assert_eq!(body["error"], "validation_error");
    let detail = body["detail"].as_array().unwrap();
    assert!(detail.iter().any(|e| e["field"] == "email" && e["kind"] == "missing"));

    assert_eq!(app.store_len(), 0);
}

#[tokio::test]
async fn test_multiple_field_errors_reported() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            "/v1/survey",
            json!({"email": "not-an-email", "age": 500}).to_string(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = extract_json(response).await;
    let fields: Vec<&str> = body["detail"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["email", "age"]);
    assert_eq!(app.store_len(), 0);
}

#[tokio::test]
async fn test_non_json_body_is_400() {
    let app = TestApp::new();

    let response = app.send(json_request("/v1/survey", "email=a@example.com")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response).await;
    assert_eq!(body["error"], "invalid_json");
    assert!(body["detail"].is_string());
    assert_eq!(app.store_len(), 0);
}

#[tokio::test]
async fn test_empty_body_is_400() {
    let app = TestApp::new();

    let response = app.send(json_request("/v1/survey", "")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(extract_json(response).await["error"], "invalid_json");
}

#[tokio::test]
async fn test_json_array_is_400() {
    let app = TestApp::new();

    let response = app
        .send(json_request("/v1/survey", json!([{"email": "a@example.com"}]).to_string()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(extract_json(response).await["error"], "invalid_json");
    assert_eq!(app.store_len(), 0);
}

#[tokio::test]
async fn test_wrong_content_type_is_400() {
    let app = TestApp::new();

    let request = Request::builder()
        .method("POST")
        .uri("/v1/survey")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(json!({"email": "a@example.com", "age": 30}).to_string()))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response).await;
    assert_eq!(body["error"], "invalid_json");
    assert_eq!(body["detail"], "Body must be application/json");
    assert_eq!(app.store_len(), 0);
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let app = TestApp::with_state(|store| AppState {
        max_body_bytes: 256,
        ..AppState::new(store)
    });

    let body = json!({"email": "a@example.com", "age": 30, "comments": "x".repeat(1024)});
    let response = app.send(json_request("/v1/survey", body.to_string())).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.store_len(), 0);
}

// =============================================================================
// Storage failure
// =============================================================================

#[tokio::test]
async fn test_unwritable_store_is_500() {
    let app = TestApp::new();

    // Replace the store file with a directory so the next open fails
    std::fs::remove_file(app.store_path()).unwrap();
    std::fs::create_dir(app.store_path()).unwrap();

    let response = app
        .send(json_request(
            "/v1/survey",
            json!({"email": "a@example.com", "age": 30}).to_string(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = extract_json(response).await;
    assert_eq!(body["error"], "storage_error");
    assert_eq!(body["detail"], "failed to persist submission");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_append_timeout_is_503_and_stores_nothing() {
    let app = TestApp::with_append_timeout(Duration::from_millis(50));

    // Occupy the store lock well past the append bound
    let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
    let store = app.store();
    let blocker = tokio::spawn(async move {
        store
            .append_with(move |_| {
                let _ = locked_tx.send(());
                std::thread::sleep(Duration::from_millis(300));
                json!({"blocker": true})
            })
            .await
    });
    locked_rx.await.unwrap();

    let response = app
        .send(json_request(
            "/v1/survey",
            json!({"email": "a@example.com", "age": 30}).to_string(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = extract_json(response).await;
    assert_eq!(body["error"], "storage_error");
    assert_eq!(body["detail"], "storage did not respond within 50 ms");

    assert!(blocker.await.unwrap().is_err());

    // Let the slow writer finish and roll back
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(app.store_lines().is_empty());
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn test_cors_allows_any_origin_on_v1() {
    let app = TestApp::new();

    let mut request = json_request(
        "/v1/survey",
        json!({"email": "a@example.com", "age": 30}).to_string(),
    );
    request
        .headers_mut()
        .insert(header::ORIGIN, "http://localhost:8080".parse().unwrap());

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_cors_disabled_sends_no_allow_origin() {
    let app = TestApp::with_state(|store| AppState {
        cors_allow_any_origin: false,
        ..AppState::new(store)
    });

    let mut request = json_request(
        "/v1/survey",
        json!({"email": "a@example.com", "age": 30}).to_string(),
    );
    request
        .headers_mut()
        .insert(header::ORIGIN, "http://localhost:8080".parse().unwrap());

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn test_ping_has_no_cors_headers() {
    let app = TestApp::new();

    let request = Request::builder()
        .uri("/ping")
        .header(header::ORIGIN, "http://localhost:8080")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

    let _: Value = extract_json(response).await;
}
