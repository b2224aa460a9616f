//! The success/error response envelope.
//!
//! # Design
//! Parsing is discriminator-first: `status` decides which branch is checked,
//! and only the `"success"` branch runs the caller's `DataSchema` on `data`.
//! A missing or unknown `status` fails closed. Extra keys at the envelope
//! and error-object level are ignored.

use std::fmt;

use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::{ValidationError, ValidationIssue};
use crate::schema::{kind, DataSchema, Schema};

/// A validated response envelope. Callers branch on the variant to reach
/// `data` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    Success { data: T },
    Error { error: ErrorBody },
}

/// The `error` object of an error envelope.
///
/// The wire format also names an `errors` field; this client requires it to
/// be absent, so it has no representation here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: Number,
    pub message: String,
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ApiResponse::Success { data } => Some(data),
            ApiResponse::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            ApiResponse::Success { .. } => None,
            ApiResponse::Error { error } => Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, ErrorBody> {
        match self {
            ApiResponse::Success { data } => Ok(data),
            ApiResponse::Error { error } => Err(error),
        }
    }
}

fn error_schema() -> Schema {
    Schema::object([
        ("code", Schema::Number),
        ("message", Schema::String),
        ("errors", Schema::Undefined),
    ])
}

/// Validate a decoded JSON document as an envelope whose `data` matches
/// `schema`.
pub fn parse_envelope<S: DataSchema>(
    value: &Value,
    schema: &S,
) -> Result<ApiResponse<S::Output>, ValidationError> {
    let Value::Object(map) = value else {
        return Err(ValidationError::new(vec![ValidationIssue::new(
            "",
            format!("expected object, received {}", kind(value)),
        )]));
    };

    match map.get("status").and_then(Value::as_str) {
        Some("success") => schema
            .parse_value(map.get("data"))
            .map(|data| ApiResponse::Success { data })
            .map_err(|issues| {
                ValidationError::new(issues.into_iter().map(|i| i.prefixed("data")).collect())
            }),
        Some("error") => {
            let mut issues = Vec::new();
            let checked = error_schema().check(map.get("error"), "error", &mut issues);
            if !issues.is_empty() {
                return Err(ValidationError::new(issues));
            }
            let body = checked.unwrap_or(Value::Null);
            let code = match &body["code"] {
                Value::Number(n) => Some(n.clone()),
                _ => None,
            };
            let message = body["message"].as_str().map(str::to_string);
            match (code, message) {
                (Some(code), Some(message)) => Ok(ApiResponse::Error {
                    error: ErrorBody { code, message },
                }),
                _ => Err(ValidationError::new(vec![ValidationIssue::new("error", "malformed error object")])),
            }
        }
        _ => Err(ValidationError::new(vec![ValidationIssue::new(
            "status",
            format!(
                "invalid discriminator value {}, expected \"success\" | \"error\"",
                map.get("status").map_or_else(|| "undefined".to_string(), Value::to_string)
            ),
        )])),
    }
}
