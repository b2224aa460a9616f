//! Error types for the envelope API client.
//!
//! # Design
//! Every failure of `ApiClient::request` is surfaced to the caller; nothing
//! is retried or defaulted. A response whose envelope says `"error"` is not
//! an `ApiError`: it parses successfully into `ApiResponse::Error`.

use std::fmt;

/// Error produced by a `Transport`. Kept boxed so the original error (and
/// its source chain) reaches the caller unmodified.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by `ApiClient`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The network round-trip failed.
    #[error("transport failed: {0}")]
    Transport(#[source] TransportError),

    /// The response body is not valid JSON.
    #[error("response body is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    /// The JSON does not match the response envelope or the data schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// `base_url + endpoint` is not an absolute URL.
    #[error("invalid request URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The request body could not be serialized to JSON.
    #[error("request body serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// The method string is not a valid HTTP method token.
    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),
}

/// A single schema mismatch, located by a dotted JSON path such as
/// `data.items[2].name`. The empty path is the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Re-root the issue under `prefix`.
    pub(crate) fn prefixed(mut self, prefix: &str) -> Self {
        self.path = join_path(prefix, &self.path);
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// All issues found while validating one response. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        debug_assert!(!issues.is_empty());
        Self { issues }
    }

    /// Whether any issue sits exactly at `path`.
    pub fn has_issue_at(&self, path: &str) -> bool {
        self.issues.iter().any(|issue| issue.path == path)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "response validation failed: ")?;
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Join a parent path and a child segment. Index segments (`[3]`) attach
/// without a dot.
pub(crate) fn join_path(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (false, true) => parent.to_string(),
        (false, false) if child.starts_with('[') => format!("{parent}{child}"),
        (false, false) => format!("{parent}.{child}"),
    }
}
