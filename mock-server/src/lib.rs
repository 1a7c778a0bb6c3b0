use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
}

pub type Db = Arc<RwLock<Vec<User>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Vec::new()));
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user))
        .route("/empty", get(empty))
        .route("/malformed", get(malformed))
        .route("/bulk/{count}", get(bulk))
        .route("/headers", get(echo_headers))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_users(State(db): State<Db>) -> Json<Vec<User>> {
    Json(db.read().await.clone())
}

async fn create_user(
    State(db): State<Db>,
    Json(input): Json<CreateUser>,
) -> (StatusCode, Json<User>) {
    let mut users = db.write().await;
    let user = User {
        id: users.len() as u64 + 1,
        name: input.name,
        email: input.email,
    };
    users.push(user.clone());
    (StatusCode::CREATED, Json(user))
}

async fn get_user(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<Json<User>, StatusCode> {
    let users = db.read().await;
    users
        .iter()
        .find(|u| u.id == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Succeeds with no body at all.
async fn empty() -> StatusCode {
    StatusCode::OK
}

/// A user object with `email` missing.
async fn malformed() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "id": 1, "name": "Ann" }))
}

/// `count` generated users, for exercising large bodies.
async fn bulk(Path(count): Path<u64>) -> Json<Vec<User>> {
    Json(
        (1..=count)
            .map(|id| User {
                id,
                name: format!("user-{id}"),
                email: format!("user-{id}@x.com"),
            })
            .collect(),
    )
}

/// Every request header, with all values per name in arrival order.
async fn echo_headers(headers: HeaderMap) -> Json<BTreeMap<String, Vec<String>>> {
    let mut echoed: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &headers {
        echoed
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    Json(echoed)
}
