//! Deterministic submission identifiers
//!
//! Used only when the caller did not supply a `submission_id`. The identifier is the hash of the
//! raw email followed by the UTC hour bucket, so repeat submissions from one sender within the
//! same hour share an identifier without any lookup against stored records.

use chrono::{DateTime, Utc};
use survey_common::{sha256_hex, time::hour_bucket};

/// Derive a submission identifier from the raw (unhashed) email and the current time
///
/// An empty email still derives an identifier: every anonymous submission in that hour
/// shares it. Callers needing uniqueness must send their own `submission_id`.
pub fn derive_submission_id(raw_email: &str, now: DateTime<Utc>) -> String {
    let mut material = String::with_capacity(raw_email.len() + 10);
    material.push_str(raw_email);
    material.push_str(&hour_bucket(now));
    sha256_hex(&material)
}
