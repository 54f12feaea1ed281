//! One-way hashing for personally identifying fields
//!
//! Every PII value that reaches storage goes through [`sha256_hex`]. There is
//! intentionally no inverse.

use sha2::{Digest, Sha256};

/// Length in characters of every token produced by [`sha256_hex`]
pub const HASH_HEX_LEN: usize = 64;

/// Hash a string with SHA-256 and return the lowercase hex digest
///
/// Deterministic: the same input always yields the same 64-character token.
pub fn sha256_hex(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    format!("{:x}", digest)
}
