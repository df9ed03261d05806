#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use pingu::handlers::create_router;
use pingu::models::{NewUser, User};
use pingu::{Config, MemoryUserStore, PairingEngine, VersionedStore};
use serde_json::Value;
use tower::util::ServiceExt;

pub struct TestContext {
    pub engine: PairingEngine<MemoryUserStore>,
    pub app: axum::Router,
}

pub fn build_test_context() -> TestContext {
    build_test_context_with(Config::default())
}

pub fn build_test_context_with(config: Config) -> TestContext {
    let engine = PairingEngine::new(MemoryUserStore::new());
    let app = create_router(engine.clone(), config);
    TestContext { engine, app }
}

pub fn new_user(name: &str) -> NewUser {
    NewUser {
        username: name.to_string(),
        email: format!("{name}@x.com"),
        password_hash: "hash".to_string(),
    }
}

pub async fn create_users(engine: &PairingEngine<MemoryUserStore>, names: &[&str]) -> Vec<User> {
    let mut users = Vec::with_capacity(names.len());
    for name in names {
        users.push(
            engine
                .store()
                .create(new_user(name))
                .await
                .expect("user should be created"),
        );
    }
    users
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send(app, Request::builder().method(method).uri(uri), body).await
}

/// Like [`request_json`] but as the given client address.
pub async fn request_json_from(
    app: &axum::Router,
    client_ip: &str,
    method: &str,
    uri: &str,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", client_ip);
    send(app, builder, None).await
}

async fn send(app: &axum::Router, mut builder: axum::http::request::Builder, body: Option<Value>) -> (StatusCode, Value) {
    let req_body = match body {
        Some(body) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let req = builder.body(req_body).expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json)
}
