//! Test helper modules for survey-intake integration tests
//!
//! Provides reusable test infrastructure:
//! - TestApp: router backed by a store in a temporary directory
//! - Request builders and JSON body extraction

#![allow(dead_code)]

pub mod test_app;

pub use test_app::{extract_json, json_request, TestApp, TEST_PEER};
