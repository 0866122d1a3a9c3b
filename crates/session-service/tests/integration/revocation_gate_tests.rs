//! E2E tests for the request-time authentication gate.
//!
//! Exercises `/api/v1/auth/me` through the spawned server: header
//! extraction, the TOKEN_EXPIRED / INVALID_TOKEN distinction, and namespace
//! separation between access and refresh credentials.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use reqwest::StatusCode;
use serde_json::json;
use session_service::models::Role;
use session_test_utils::server_harness::TestSessionServer;
use sqlx::PgPool;

async fn me_with_auth(server: &TestSessionServer, auth: Option<String>) -> reqwest::Response {
    let mut request = reqwest::Client::new().get(format!("{}/api/v1/auth/me", server.url()));
    if let Some(value) = auth {
        request = request.header("authorization", value);
    }
    request.send().await.expect("me request should send")
}

async fn error_code(response: reqwest::Response) -> String {
    let body: serde_json::Value = response.json().await.expect("json error body");
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_me_returns_authenticated_identity(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    let user_id = server.seed_user("alice", "password123", "admin").await?;

    let login = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/login", server.url()))
        .json(&json!({"username": "alice", "password": "password123"}))
        .send()
        .await?;
    let body: serde_json::Value = login.json().await?;
    let token = body["access_token"].as_str().expect("access_token");

    let response = me_with_auth(&server, Some(format!("Bearer {token}"))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let me: serde_json::Value = response.json().await?;
    assert_eq!(me["user_id"].as_str(), Some(user_id.to_string().as_str()));
    assert_eq!(me["username"].as_str(), Some("alice"));
    assert_eq!(me["role"].as_str(), Some("admin"));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_me_without_header_rejected(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;

    let response = me_with_auth(&server, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "INVALID_TOKEN");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_me_with_garbage_token_rejected(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;

    let response = me_with_auth(&server, Some("Bearer complete.garbage".to_string())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "INVALID_TOKEN");

    Ok(())
}

/// An access credential whose only defect is expiry must read TOKEN_EXPIRED,
/// so clients know a rotation (not a re-login) is the right recovery.
#[sqlx::test(migrations = "../../migrations")]
async fn test_expired_token_reads_token_expired(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    let user_id = server.seed_user("alice", "password123", "user").await?;

    let token = server.issue_expired_access_token(user_id, "alice", Role::User, 3600)?;

    let response = me_with_auth(&server, Some(format!("Bearer {token}"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "TOKEN_EXPIRED");

    Ok(())
}

/// A refresh credential presented as a Bearer token must not authenticate:
/// the namespaces are signed with distinct secrets.
#[sqlx::test(migrations = "../../migrations")]
async fn test_refresh_cookie_value_rejected_as_bearer(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    server.seed_user("alice", "password123", "user").await?;

    let login = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/login", server.url()))
        .json(&json!({"username": "alice", "password": "password123"}))
        .send()
        .await?;
    let refresh_value = login
        .headers()
        .get("set-cookie")
        .and_then(|h| h.to_str().ok())
        .and_then(|c| c.split(';').next())
        .and_then(|pair| pair.split('=').nth(1))
        .expect("refresh cookie present")
        .to_string();

    let response = me_with_auth(&server, Some(format!("Bearer {refresh_value}"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "INVALID_TOKEN");

    Ok(())
}
