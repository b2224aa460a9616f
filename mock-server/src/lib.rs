use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::net::TcpListener;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: u64,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub name: String,
}

/// Error payload of an error envelope.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    pub code: u16,
    pub message: String,
}

/// The `status`-tagged wrapper every JSON route answers with.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope<T> {
    Success { data: T },
    Error { error: ErrorInfo },
}

/// What `/echo` saw of the incoming request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: Option<String>,
}

type Reply<T> = (StatusCode, Json<Envelope<T>>);

fn success<T>(data: T) -> Reply<T> {
    (StatusCode::OK, Json(Envelope::Success { data }))
}

fn failure<T>(status: StatusCode, message: &str) -> Reply<T> {
    let error = ErrorInfo {
        code: status.as_u16(),
        message: message.to_string(),
    };
    (status, Json(Envelope::Error { error }))
}

#[derive(Clone)]
struct Db {
    users: Arc<RwLock<BTreeMap<u64, User>>>,
}

/// Router seeded with user 1 ("Ada").
pub fn app() -> Router {
    let users = BTreeMap::from([(
        1,
        User {
            id: 1,
            name: "Ada".to_string(),
        },
    )]);
    let db = Db {
        users: Arc::new(RwLock::new(users)),
    };
    Router::new()
        .route("/users", post(create_user))
        .route("/users/{id}", get(get_user))
        .route("/me", get(me))
        .route("/echo", any(echo))
        .route("/broken/not-json", get(|| async { "not json" }))
        .route(
            "/broken/no-status",
            get(|| async { Json(serde_json::json!({"data": {"id": 1, "name": "Ada"}})) }),
        )
        .route(
            "/broken/bad-data",
            get(|| async { success(serde_json::json!({"id": "one", "name": "Ada"})) }),
        )
        .route(
            "/broken/with-errors",
            get(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "status": "error",
                        "error": {"code": 400, "message": "invalid", "errors": {"name": "required"}}
                    })),
                )
            }),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}

async fn get_user(State(db): State<Db>, Path(id): Path<u64>) -> Reply<User> {
    match db.users.read().await.get(&id) {
        Some(user) => success(user.clone()),
        None => failure(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn create_user(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateUser>,
) -> Reply<User> {
    if bearer(&headers).is_none() {
        return failure(StatusCode::UNAUTHORIZED, "missing bearer token");
    }
    let mut users = db.users.write().await;
    let id = users.keys().next_back().map_or(1, |last| last + 1);
    let user = User { id, name: input.name };
    users.insert(id, user.clone());
    tracing::debug!(id, "user created");
    (StatusCode::CREATED, Json(Envelope::Success { data: user }))
}

#[derive(Serialize)]
struct Me {
    token: String,
}

async fn me(headers: HeaderMap) -> Reply<Me> {
    match bearer(&headers) {
        Some(token) => success(Me {
            token: token.to_string(),
        }),
        None => failure(StatusCode::UNAUTHORIZED, "missing bearer token"),
    }
}

async fn echo(
    method: Method,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: String,
) -> Reply<Echo> {
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            seen.entry(name.as_str().to_string()).or_default().push(value.to_string());
        }
    }
    success(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query,
        headers: seen,
        body: (!body.is_empty()).then_some(body),
    })
}
