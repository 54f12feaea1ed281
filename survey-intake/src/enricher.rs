//! Record enrichment
//!
//! Turns a validated [`SurveySubmission`] into a [`StoredSurveyRecord`]: PII is hashed, the
//! identifier is derived when missing, and request metadata is attached. The submission is
//! consumed, so the raw email cannot outlive this step.

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use survey_common::sha256_hex;

use crate::identifier::derive_submission_id;
use crate::record::StoredSurveyRecord;
use crate::submission::SurveySubmission;

/// Request facts observed by the server, independent of the HTTP framework
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// Raw `User-Agent` header value
    pub user_agent: Option<String>,
    /// Raw `X-Forwarded-For` header value
    pub forwarded_for: Option<String>,
    /// Socket peer address
    pub peer_ip: Option<IpAddr>,
}

impl RequestMeta {
    /// Client address: first forwarded-for entry, else peer address, else empty
    pub fn client_ip(&self) -> String {
        let forwarded = self
            .forwarded_for
            .as_deref()
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty());

        match (forwarded, self.peer_ip) {
            (Some(first), _) => first.to_string(),
            (None, Some(peer)) => peer.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Build the storable record for a validated submission
///
/// `now` becomes `received_at` and also selects the hour bucket for a derived identifier.
pub fn enrich(
    submission: SurveySubmission,
    meta: &RequestMeta,
    now: DateTime<Utc>,
) -> StoredSurveyRecord {
    let SurveySubmission {
        email: raw_email,
        age,
        submission_id,
        answers,
    } = submission;

    let email_hash = sha256_hex(&raw_email);
    let age_hash = sha256_hex(&age.to_string());

    let submission_id = match submission_id {
        Some(id) if !id.is_empty() => id,
        _ => derive_submission_id(&raw_email, now),
    };

    StoredSurveyRecord::new(
        email_hash,
        age_hash,
        submission_id,
        answers,
        now,
        meta.client_ip(),
        meta.user_agent.clone().unwrap_or_default(),
    )
}
