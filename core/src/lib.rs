//! Typed client for JSON APIs that wrap every response in a status envelope.
//!
//! # Overview
//! `ApiClient` composes a request from the caller's endpoint, method, body
//! and overrides plus its own base URL and bearer token, sends it through a
//! `Transport`, and validates the JSON reply against
//!
//! ```text
//! { "status": "success", "data": <schema> }
//! | { "status": "error", "error": { "code": number, "message": string } }
//! ```
//!
//! # Design
//! - Host-does-IO split: `build_request` and `parse_response` are pure; only
//!   the `Transport` performs network I/O.
//! - The data schema is a runtime `Schema` or any serde type via `Typed`.
//! - No retries, timeouts or status-code handling: the envelope alone decides
//!   success versus error.
//!
//! ```no_run
//! use envelope_core::{ApiClient, ApiResponse, Schema};
//!
//! # async fn run() -> Result<(), envelope_core::ApiError> {
//! let client = ApiClient::new("https://api.example.com");
//! let user = Schema::object([("id", Schema::Number), ("name", Schema::String)]);
//! match client.request("/users/1", "GET", &user, None, None).await? {
//!     ApiResponse::Success { data } => println!("{data}"),
//!     ApiResponse::Error { error } => eprintln!("{error}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod envelope;
pub mod error;
pub mod http;
pub mod options;
pub mod schema;
pub mod transport;

pub use client::ApiClient;
pub use envelope::{parse_envelope, ApiResponse, ErrorBody};
pub use error::{ApiError, TransportError, ValidationError, ValidationIssue};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use options::ExtraOptions;
pub use schema::{typed, DataSchema, Schema, Typed};
pub use transport::{ReqwestTransport, Transport};
