//! De-identified survey record as persisted to the store

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Finished record, one per accepted submission
///
/// Built only by [`crate::enricher::enrich`]. Fields are private so a record cannot be altered
/// between enrichment and append.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSurveyRecord {
    /// SHA-256 of the submitted email
    email: String,
    /// SHA-256 of the submitted age, as a decimal string
    age: String,
    submission_id: String,
    #[serde(flatten)]
    answers: Map<String, Value>,
    received_at: DateTime<Utc>,
    ip: String,
    user_agent: String,
}

impl StoredSurveyRecord {
    pub(crate) fn new(
        email: String,
        age: String,
        submission_id: String,
        answers: Map<String, Value>,
        received_at: DateTime<Utc>,
        ip: String,
        user_agent: String,
    ) -> Self {
        Self {
            email,
            age,
            submission_id,
            answers,
            received_at,
            ip,
            user_agent,
        }
    }

    pub fn email_hash(&self) -> &str {
        &self.email
    }

    pub fn age_hash(&self) -> &str {
        &self.age
    }

    pub fn submission_id(&self) -> &str {
        &self.submission_id
    }

    pub fn answers(&self) -> &Map<String, Value> {
        &self.answers
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}
