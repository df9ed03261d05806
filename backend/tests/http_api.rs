mod common;

use axum::http::StatusCode;
use common::{build_test_context, build_test_context_with, create_users, request_json, request_json_from};
use pingu::Config;
use serde_json::json;

#[tokio::test]
async fn health_returns_ok() {
    let ctx = build_test_context();

    let (status, body) = request_json(&ctx.app, "GET", "/v1/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn register_creates_user_and_rejects_duplicate_email() {
    let ctx = build_test_context();
    let payload = json!({
        "username": "alice",
        "email": "alice@x.com",
        "password": "secret-password"
    });

    let (status, body) =
        request_json(&ctx.app, "POST", "/v1/authentication/user", Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["user"]["id"].as_i64().unwrap() > 0);
    assert!(body["user"]["created_at"].is_string());
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(body["invitation_token"].as_str().unwrap().len(), 36);

    let duplicate = json!({
        "username": "alice2",
        "email": "alice@x.com",
        "password": "secret-password"
    });
    let (status, body) =
        request_json(&ctx.app, "POST", "/v1/authentication/user", Some(duplicate)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "a user with that email already exists");
}

#[tokio::test]
async fn register_validates_payload() {
    let ctx = build_test_context();
    let payload = json!({
        "username": "alice",
        "email": "not-an-email",
        "password": "secret-password"
    });

    let (status, _) = request_json(&ctx.app, "POST", "/v1/authentication/user", Some(payload)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(ctx.engine.store().user_count(), 0);
}

#[tokio::test]
async fn unknown_user_is_404() {
    let ctx = build_test_context();

    let (status, body) = request_json(&ctx.app, "GET", "/v1/users/999", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "user 999 not found");
}

#[tokio::test]
async fn pairing_round_trip_over_http() {
    let ctx = build_test_context();
    let users = create_users(&ctx.engine, &["alice", "bob"]).await;
    let (a, b) = (users[0].id, users[1].id);

    let (status, body) =
        request_json(&ctx.app, "PUT", &format!("/v1/users/{a}/partner/{b}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["partner_id"], b.0);
    assert_eq!(body["partner"]["partner_id"], a.0);

    let (status, body) = request_json(&ctx.app, "PUT", &format!("/v1/users/{a}/ping"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["pinged_partner_count"], 1);
    assert_eq!(body["partner"]["pinged"], true);

    let (status, body) = request_json(&ctx.app, "PUT", &format!("/v1/users/{b}/pong"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pinged"], false);

    let (status, _) = request_json(&ctx.app, "DELETE", &format!("/v1/users/{a}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) =
        request_json(&ctx.app, "PUT", &format!("/v1/users/{b}/unpartner"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["user"]["partner_id"].is_null());
    assert!(body["partner"]["partner_id"].is_null());
    assert_eq!(body["partner"]["pinged_partner_count"], 0);

    let (status, _) = request_json(&ctx.app, "DELETE", &format!("/v1/users/{a}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn ping_and_pong_without_partner_are_404() {
    let ctx = build_test_context();
    let users = create_users(&ctx.engine, &["alice"]).await;
    let a = users[0].id;

    for action in ["ping", "pong", "unpartner"] {
        let (status, body) =
            request_json(&ctx.app, "PUT", &format!("/v1/users/{a}/{action}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{action}");
        assert_eq!(body["error"], "partner not found");
    }
}

#[tokio::test]
async fn partner_with_self_is_400_and_with_taken_user_is_409() {
    let ctx = build_test_context();
    let users = create_users(&ctx.engine, &["alice", "bob", "carol"]).await;
    let (a, b, c) = (users[0].id, users[1].id, users[2].id);

    let (status, _) =
        request_json(&ctx.app, "PUT", &format!("/v1/users/{a}/partner/{a}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        request_json(&ctx.app, "PUT", &format!("/v1/users/{a}/partner/{b}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        request_json(&ctx.app, "PUT", &format!("/v1/users/{c}/partner/{b}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn patch_with_stale_version_conflicts() {
    let ctx = build_test_context();
    let users = create_users(&ctx.engine, &["alice", "bob"]).await;
    let alice = &users[0];
    let version = alice.version.0;

    let (status, body) = request_json(
        &ctx.app,
        "PATCH",
        &format!("/v1/users/{}", alice.id),
        Some(json!({ "username": "alicia", "version": version })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alicia");
    assert_eq!(body["email"], "alice@x.com");
    assert_eq!(body["version"], version + 1);

    let (status, _) = request_json(
        &ctx.app,
        "PATCH",
        &format!("/v1/users/{}", alice.id),
        Some(json!({ "email": "new@x.com", "version": version })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = request_json(
        &ctx.app,
        "PATCH",
        &format!("/v1/users/{}", alice.id),
        Some(json!({ "email": "bob@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "a user with that email already exists");
}

#[tokio::test]
async fn requests_beyond_the_per_client_limit_are_429() {
    let ctx = build_test_context_with(Config {
        rate_limit_per_minute: 3,
        ..Config::default()
    });

    for _ in 0..3 {
        let (status, _) = request_json_from(&ctx.app, "203.0.113.7", "GET", "/v1/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = request_json_from(&ctx.app, "203.0.113.7", "GET", "/v1/health").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Rate limit exceeded. Please try again later.");

    let (status, _) = request_json_from(&ctx.app, "198.51.100.2", "GET", "/v1/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn default_limit_allows_a_hundred_requests_per_minute() {
    let ctx = build_test_context();

    for _ in 0..100 {
        let (status, _) = request_json_from(&ctx.app, "203.0.113.9", "GET", "/v1/health").await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = request_json_from(&ctx.app, "203.0.113.9", "GET", "/v1/health").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
