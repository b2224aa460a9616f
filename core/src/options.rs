//! Per-request overrides.

use indexmap::IndexMap;

/// Extra headers and query parameters for a single request.
///
/// Both maps keep insertion order and hold one value per key. Headers
/// replace any header the client computed with the same name; query entries
/// are applied to the URL with set semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraOptions {
    pub headers: IndexMap<String, String>,
    pub query: IndexMap<String, String>,
}

impl ExtraOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }
}
