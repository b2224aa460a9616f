//! Request assembly, transport dispatch and envelope validation.
//!
//! # Design
//! `ApiClient` holds a `base_url`, an optional bearer token and a
//! `Transport`. `request` is split into a pure `build_request`, the
//! transport round-trip, and a pure `parse_response`, so the first and last
//! steps can be exercised without a network.
//!
//! The token sits behind an `RwLock` so `set_token` works through a shared
//! reference. Each request reads it once while being built; a concurrent
//! `set_token` affects only requests built after it. Nothing orders a
//! `set_token` against in-flight requests.

use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::envelope::{parse_envelope, ApiResponse};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::options::ExtraOptions;
use crate::schema::DataSchema;
use crate::transport::{ReqwestTransport, Transport};

/// Client for JSON APIs that answer with a `status`-tagged envelope.
#[derive(Debug)]
pub struct ApiClient<T = ReqwestTransport> {
    base_url: String,
    token: RwLock<Option<String>>,
    transport: T,
}

impl ApiClient<ReqwestTransport> {
    /// Client over a default `reqwest::Client`. `base_url` is stored as-is;
    /// endpoints are appended to it verbatim.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_transport(base_url, ReqwestTransport::new())
    }
}

impl<T> ApiClient<T> {
    pub fn with_transport(base_url: impl Into<String>, transport: T) -> Self {
        Self {
            base_url: base_url.into(),
            token: RwLock::new(None),
            transport,
        }
    }

    /// Builder-style variant of [`ApiClient::set_token`].
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.set_token(Some(token.into()));
        self
    }

    /// Replace the bearer token, or clear it with `None`. Only requests built
    /// after this call see the new value.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Assemble the request for `endpoint` without sending it.
    ///
    /// Headers are `Authorization` (when a non-empty token is stored), then
    /// `Content-Type: application/json` (when a body is given), then every
    /// `extra.headers` entry replacing any same-named header. A JSON `null`
    /// body counts as no body.
    pub fn build_request(
        &self,
        endpoint: &str,
        method: &str,
        body: Option<&Value>,
        extra: Option<&ExtraOptions>,
    ) -> Result<HttpRequest, ApiError> {
        let method: HttpMethod = method.parse()?;
        let body = body.filter(|b| !b.is_null());

        let mut headers = Vec::new();
        if let Some(token) = self.token().filter(|t| !t.is_empty()) {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        let raw = format!("{}{}", self.base_url, endpoint);
        let mut url = Url::parse(&raw).map_err(|source| ApiError::InvalidUrl { url: raw.clone(), source })?;

        if let Some(extra) = extra {
            for (name, value) in &extra.headers {
                set_header(&mut headers, name, value);
            }
            for (name, value) in &extra.query {
                set_query_param(&mut url, name, value);
            }
        }

        let body = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(ApiError::Serialization)?;

        Ok(HttpRequest {
            method,
            url: url.into(),
            headers,
            body,
        })
    }

    /// Decode `response.body` as JSON and validate it as an envelope whose
    /// `data` matches `schema`. The HTTP status is not consulted.
    pub fn parse_response<S: DataSchema>(
        &self,
        response: &HttpResponse,
        schema: &S,
    ) -> Result<ApiResponse<S::Output>, ApiError> {
        let value: Value = serde_json::from_str(&response.body).map_err(ApiError::Decode)?;
        parse_envelope(&value, schema).map_err(|err| {
            debug!(status = response.status, error = %err, "response envelope rejected");
            ApiError::Validation(err)
        })
    }
}

impl<T: Clone> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            token: RwLock::new(self.token()),
            transport: self.transport.clone(),
        }
    }
}

impl<T: Transport> ApiClient<T> {
    /// Build, send and validate one request.
    ///
    /// Fails on transport errors, non-JSON bodies and envelopes that do not
    /// match. An `"error"` envelope is a successful return.
    pub async fn request<S: DataSchema>(
        &self,
        endpoint: &str,
        method: &str,
        schema: &S,
        body: Option<&Value>,
        extra: Option<&ExtraOptions>,
    ) -> Result<ApiResponse<S::Output>, ApiError> {
        let request = self.build_request(endpoint, method, body, extra)?;
        debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.send(request).await.map_err(ApiError::Transport)?;
        self.parse_response(&response, schema)
    }

    /// [`ApiClient::request`] with a typed body serialized through serde.
    pub async fn request_with<B, S>(
        &self,
        endpoint: &str,
        method: &str,
        schema: &S,
        body: &B,
        extra: Option<&ExtraOptions>,
    ) -> Result<ApiResponse<S::Output>, ApiError>
    where
        B: Serialize + ?Sized,
        S: DataSchema,
    {
        let body = serde_json::to_value(body).map_err(ApiError::Serialization)?;
        self.request(endpoint, method, schema, Some(&body), extra).await
    }
}

/// Insert or replace a header, matching names case-insensitively. A
/// replaced header keeps its position and takes the caller's spelling.
fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
        Some(entry) => *entry = (name.to_string(), value.to_string()),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

/// `URLSearchParams.set`: the first pair named `name` takes `value` and
/// later duplicates are dropped; with no such pair, one is appended.
fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let mut found = false;
    pairs.retain_mut(|(key, v)| {
        if key != name {
            return true;
        }
        if found {
            return false;
        }
        found = true;
        *v = value.to_string();
        true
    });
    if !found {
        pairs.push((name.to_string(), value.to_string()));
    }
    url.query_pairs_mut().clear().extend_pairs(&pairs);
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::TransportError;
    use crate::schema::{typed, Schema};

    fn client() -> ApiClient {
        ApiClient::new("https://api.example.com")
    }

    fn user() -> Schema {
        Schema::object([("id", Schema::Number), ("name", Schema::String)])
    }

    fn response(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn get_without_token_or_body_has_no_headers() {
        let req = client().build_request("/users/1", "GET", None, None).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "https://api.example.com/users/1");
        assert!(req.headers.is_empty());
        assert!(req.body.is_none());
    }

    #[test]
    fn base_url_is_stored_unchanged() {
        let client = ApiClient::new("https://api.example.com/v1/");
        assert_eq!(client.base_url(), "https://api.example.com/v1/");
        let req = client.build_request("users", "GET", None, None).unwrap();
        assert_eq!(req.url, "https://api.example.com/v1/users");
    }

    #[test]
    fn token_adds_exactly_one_authorization_header() {
        let client = client();
        client.set_token(Some("secret".to_string()));
        let req = client.build_request("/me", "GET", None, None).unwrap();
        let auth: Vec<_> = req
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .collect();
        assert_eq!(auth.len(), 1);
        assert_eq!(req.header("Authorization"), Some("Bearer secret"));

        client.set_token(None);
        let req = client.build_request("/me", "GET", None, None).unwrap();
        assert_eq!(req.header("Authorization"), None);
    }

    #[test]
    fn empty_token_sends_no_authorization() {
        let client = client().with_token("");
        let req = client.build_request("/me", "GET", None, None).unwrap();
        assert_eq!(req.header("Authorization"), None);
    }

    #[test]
    fn token_change_does_not_touch_built_requests() {
        let client = client().with_token("old");
        let before = client.build_request("/me", "GET", None, None).unwrap();
        client.set_token(Some("new".to_string()));
        let after = client.build_request("/me", "GET", None, None).unwrap();
        assert_eq!(before.header("Authorization"), Some("Bearer old"));
        assert_eq!(after.header("Authorization"), Some("Bearer new"));
    }

    #[test]
    fn body_sets_content_type_and_json_text() {
        let body = json!({"name": "Ada", "tags": ["math"]});
        let req = client().build_request("/users", "POST", Some(&body), None).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.body.as_deref(), Some(r#"{"name":"Ada","tags":["math"]}"#));
    }

    #[test]
    fn null_body_counts_as_absent() {
        let req = client().build_request("/users", "POST", Some(&Value::Null), None).unwrap();
        assert!(req.body.is_none());
        assert_eq!(req.header("Content-Type"), None);
    }

    #[test]
    fn falsy_but_present_body_is_sent() {
        let req = client().build_request("/flag", "PUT", Some(&json!(false)), None).unwrap();
        assert_eq!(req.body.as_deref(), Some("false"));
        assert_eq!(req.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn extra_headers_override_computed_ones() {
        let client = client().with_token("secret");
        let extra = ExtraOptions::new()
            .header("content-type", "application/merge-patch+json")
            .header("Authorization", "Basic abc")
            .header("X-Trace", "1");
        let body = json!({"name": "Ada"});
        let req = client.build_request("/users/1", "PATCH", Some(&body), Some(&extra)).unwrap();
        assert_eq!(
            req.headers,
            vec![
                ("Authorization".to_string(), "Basic abc".to_string()),
                ("content-type".to_string(), "application/merge-patch+json".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn query_entries_are_appended() {
        let extra = ExtraOptions::new().query("page", "2").query("q", "a b");
        let req = client().build_request("/users", "GET", None, Some(&extra)).unwrap();
        assert_eq!(req.url, "https://api.example.com/users?page=2&q=a+b");
    }

    #[test]
    fn query_entries_override_endpoint_params_and_keep_others() {
        let extra = ExtraOptions::new().query("page", "3");
        let req = client()
            .build_request("/users?page=1&sort=name&page=9", "GET", None, Some(&extra))
            .unwrap();
        assert_eq!(req.url, "https://api.example.com/users?page=3&sort=name");
    }

    #[test]
    fn endpoint_query_survives_without_extra() {
        let req = client().build_request("/users?sort=name", "GET", None, None).unwrap();
        assert_eq!(req.url, "https://api.example.com/users?sort=name");
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let client = ApiClient::new("api.example.com");
        let err = client.build_request("/users", "GET", None, None).unwrap_err();
        assert!(matches!(err, ApiError::InvalidUrl { ref url, .. } if url == "api.example.com/users"));
    }

    #[test]
    fn invalid_method_is_rejected() {
        let err = client().build_request("/users", "NOT A VERB", None, None).unwrap_err();
        assert!(matches!(err, ApiError::InvalidMethod(_)));
    }

    #[test]
    fn parse_success_envelope() {
        let res = response(r#"{"status":"success","data":{"id":1,"name":"Ada"}}"#);
        let parsed = client().parse_response(&res, &user()).unwrap();
        assert_eq!(parsed, ApiResponse::Success { data: json!({"id": 1, "name": "Ada"}) });
    }

    #[test]
    fn parse_ignores_http_status() {
        let mut res = response(r#"{"status":"success","data":{"id":1,"name":"Ada"}}"#);
        res.status = 500;
        assert!(client().parse_response(&res, &user()).unwrap().is_success());

        let mut res = response(r#"{"status":"error","error":{"code":404,"message":"not found"}}"#);
        res.status = 200;
        let parsed = client().parse_response(&res, &user()).unwrap();
        assert_eq!(parsed.error().unwrap().message, "not found");
    }

    #[test]
    fn parse_invalid_data_fails_validation() {
        let res = response(r#"{"status":"success","data":{"id":"1","name":"Ada"}}"#);
        let err = client().parse_response(&res, &user()).unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref v) if v.has_issue_at("data.id")));
    }

    #[test]
    fn parse_bad_json_fails_decode() {
        let err = client().parse_response(&response("<html>"), &user()).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn parse_missing_status_fails_validation() {
        let res = response(r#"{"data":{"id":1,"name":"Ada"}}"#);
        let err = client().parse_response(&res, &user()).unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref v) if v.has_issue_at("status")));
    }

    #[test]
    fn clone_copies_token_without_sharing_it() {
        let original = client().with_token("a");
        let copy = original.clone();
        original.set_token(Some("b".to_string()));
        assert_eq!(copy.token().as_deref(), Some("a"));
        assert_eq!(original.token().as_deref(), Some("b"));
    }

    /// Records every request and answers with a canned response.
    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<HttpRequest>>,
        reply: Mutex<Option<Result<HttpResponse, String>>>,
    }

    #[async_trait]
    impl Transport for Recording {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.sent.lock().unwrap().push(request);
            match self.reply.lock().unwrap().clone() {
                Some(Ok(res)) => Ok(res),
                Some(Err(msg)) => Err(msg.into()),
                None => Err("no reply configured".into()),
            }
        }
    }

    fn recording(reply: Result<HttpResponse, String>) -> Arc<Recording> {
        let transport = Arc::new(Recording::default());
        *transport.reply.lock().unwrap() = Some(reply);
        transport
    }

    #[tokio::test]
    async fn request_sends_built_request_and_parses_reply() {
        let transport = recording(Ok(response(r#"{"status":"success","data":{"id":1,"name":"Ada"}}"#)));
        let client = ApiClient::with_transport("https://api.example.com", transport).with_token("t");

        let parsed = client.request("/users/1", "GET", &user(), None, None).await.unwrap();
        assert_eq!(parsed.data(), Some(&json!({"id": 1, "name": "Ada"})));

        let sent = client.transport().sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "https://api.example.com/users/1");
        assert_eq!(sent[0].header("Authorization"), Some("Bearer t"));
    }

    #[tokio::test]
    async fn request_propagates_transport_failure() {
        let transport = recording(Err("connection refused".to_string()));
        let client = ApiClient::with_transport("https://api.example.com", transport);
        let err = client.request("/users/1", "GET", &user(), None, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(ref e) if e.to_string() == "connection refused"));
    }

    #[tokio::test]
    async fn request_with_serializes_typed_body() {
        #[derive(Serialize)]
        struct NewUser<'a> {
            name: &'a str,
        }

        let transport = recording(Ok(response(r#"{"status":"success","data":7}"#)));
        let client = ApiClient::with_transport("https://api.example.com", transport.clone());
        let parsed = client
            .request_with("/users", "POST", &typed::<u32>(), &NewUser { name: "Ada" }, None)
            .await
            .unwrap();
        assert_eq!(parsed.into_result(), Ok(7));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"name":"Ada"}"#));
        assert_eq!(sent[0].header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn request_with_keeps_struct_field_order() {
        #[derive(Serialize)]
        struct Signup<'a> {
            zname: &'a str,
            age: u8,
            middle: bool,
        }

        let transport = recording(Ok(response(r#"{"status":"success","data":null}"#)));
        let client = ApiClient::with_transport("https://api.example.com", transport);
        let body = Signup { zname: "Ada", age: 36, middle: false };
        client.request_with("/signup", "POST", &Schema::Any, &body, None).await.unwrap();

        let sent = client.transport().sent.lock().unwrap();
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"zname":"Ada","age":36,"middle":false}"#));
    }

    #[test]
    fn value_body_keeps_key_order() {
        let body: Value = serde_json::from_str(r#"{"b":1,"a":2,"c":{"z":0,"y":1}}"#).unwrap();
        let req = client().build_request("/x", "POST", Some(&body), None).unwrap();
        assert_eq!(req.body.as_deref(), Some(r#"{"b":1,"a":2,"c":{"z":0,"y":1}}"#));
    }
}
