//! # Survey Common Library
//!
//! Shared code for the survey intake service:
//! - Error types
//! - Bootstrap configuration loading and data folder resolution
//! - PII hashing
//! - Timestamp utilities (UTC clock, hour buckets)

pub mod config;
pub mod error;
pub mod hash;
pub mod time;

pub use error::{Error, Result};
pub use hash::sha256_hex;
