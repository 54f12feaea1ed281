//! Survey submission schema and validation
//!
//! [`validate`] is the only way to obtain a [`SurveySubmission`]. It either returns a fully typed
//! submission or every field-level problem it found, never a partially built value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::error;

/// Upper bound (inclusive) accepted for `age`
pub const MAX_AGE: u64 = 120;

/// Longest accepted email address (RFC 5321 path limit)
pub const MAX_EMAIL_LEN: usize = 254;

/// Keys assigned by the server during enrichment; clients may not send them
pub const RESERVED_FIELDS: [&str; 3] = ["received_at", "ip", "user_agent"];

/// Basic email shape: one `@`, no whitespace, a dot somewhere in the domain
static EMAIL_SHAPE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$")
        .map_err(|e| error!("Email shape pattern failed to compile: {}", e))
        .ok()
});

/// A submission that passed schema validation
///
/// `email` is still the raw, unhashed address here. It only lives until enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveySubmission {
    pub email: String,
    pub age: u64,
    /// Caller-supplied identifier, if any (non-blank when present)
    pub submission_id: Option<String>,
    /// Free-form survey answers, in the order the client sent them
    pub answers: Map<String, Value>,
}

/// Why a single field was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Missing,
    WrongType,
    InvalidFormat,
    OutOfRange,
    Empty,
    Reserved,
}

/// One field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            kind,
            message: message.into(),
        }
    }
}

/// Validation outcome when the input cannot become a [`SurveySubmission`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Top-level value is not a JSON object
    #[error("request body must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Object did not satisfy the schema
    #[error("{} field error(s)", .0.len())]
    Fields(Vec<FieldError>),
}

/// Validate an untyped JSON value against the survey schema
///
/// All field errors are collected before returning so the caller can fix the
/// request in one round trip.
pub fn validate(raw: Value) -> Result<SurveySubmission, ValidationError> {
    let mut object = match raw {
        Value::Object(map) => map,
        other => return Err(ValidationError::NotAnObject(json_type_name(&other))),
    };

    let mut errors = Vec::new();

    let email = validate_email(object.remove("email"), &mut errors);
    let age = validate_age(object.remove("age"), &mut errors);
    let submission_id = validate_submission_id(object.remove("submission_id"), &mut errors);

    for reserved in RESERVED_FIELDS {
        if object.contains_key(reserved) {
            errors.push(FieldError::new(
                reserved,
                FieldErrorKind::Reserved,
                "field is assigned by the server and may not be supplied",
            ));
        }
    }

    match (email, age, submission_id) {
        (Some(email), Some(age), Ok(submission_id)) if errors.is_empty() => Ok(SurveySubmission {
            email,
            age,
            submission_id,
            answers: object,
        }),
        _ => Err(ValidationError::Fields(errors)),
    }
}

fn validate_email(value: Option<Value>, errors: &mut Vec<FieldError>) -> Option<String> {
    let email = match value {
        None | Some(Value::Null) => {
            errors.push(FieldError::new("email", FieldErrorKind::Missing, "field required"));
            return None;
        }
        Some(Value::String(s)) => s,
        Some(other) => {
            errors.push(FieldError::new(
                "email",
                FieldErrorKind::WrongType,
                format!("expected string, got {}", json_type_name(&other)),
            ));
            return None;
        }
    };

    if email.len() > MAX_EMAIL_LEN {
        errors.push(FieldError::new(
            "email",
            FieldErrorKind::InvalidFormat,
            format!("email must be at most {} characters", MAX_EMAIL_LEN),
        ));
        return None;
    }

    if !looks_like_email(&email) {
        errors.push(FieldError::new(
            "email",
            FieldErrorKind::InvalidFormat,
            "value is not a valid email address",
        ));
        return None;
    }

    Some(email)
}

fn validate_age(value: Option<Value>, errors: &mut Vec<FieldError>) -> Option<u64> {
    let number = match value {
        None | Some(Value::Null) => {
            errors.push(FieldError::new("age", FieldErrorKind::Missing, "field required"));
            return None;
        }
        Some(Value::Number(n)) => n,
        Some(other) => {
            errors.push(FieldError::new(
                "age",
                FieldErrorKind::WrongType,
                format!("expected integer, got {}", json_type_name(&other)),
            ));
            return None;
        }
    };

    let range_message = format!("age must be between 0 and {}", MAX_AGE);
    match number.as_u64() {
        Some(age) if age <= MAX_AGE => Some(age),
        Some(_) => {
            errors.push(FieldError::new("age", FieldErrorKind::OutOfRange, range_message));
            None
        }
        None if number.is_i64() => {
            // Only negative integers fail as_u64 but pass is_i64
            errors.push(FieldError::new("age", FieldErrorKind::OutOfRange, range_message));
            None
        }
        None => {
            errors.push(FieldError::new(
                "age",
                FieldErrorKind::WrongType,
                "expected integer, got fractional number",
            ));
            None
        }
    }
}

/// `Err(())` marks a rejected value; the error itself is already in `errors`
fn validate_submission_id(
    value: Option<Value>,
    errors: &mut Vec<FieldError>,
) -> Result<Option<String>, ()> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(FieldError::new(
                "submission_id",
                FieldErrorKind::Empty,
                "submission_id must not be blank when provided",
            ));
            Err(())
        }
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => {
            errors.push(FieldError::new(
                "submission_id",
                FieldErrorKind::WrongType,
                format!("expected string, got {}", json_type_name(&other)),
            ));
            Err(())
        }
    }
}

fn looks_like_email(candidate: &str) -> bool {
    match EMAIL_SHAPE.as_ref() {
        Some(re) => re.is_match(candidate),
        None => false,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
