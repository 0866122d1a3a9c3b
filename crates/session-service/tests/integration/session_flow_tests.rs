//! E2E tests for the login and logout flows.
//!
//! Exercises the real HTTP surface: response bodies, status codes, and the
//! refresh cookie's transport attributes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use common::secret::ExposeSecret;
use reqwest::StatusCode;
use serde_json::json;
use session_service::crypto;
use session_service::models::Role;
use session_test_utils::server_harness::TestSessionServer;
use sqlx::PgPool;

async fn login_response(
    server: &TestSessionServer,
    client: &reqwest::Client,
    username: &str,
    password: &str,
) -> reqwest::Response {
    client
        .post(format!("{}/api/v1/auth/login", server.url()))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await
        .expect("login request should send")
}

/// Happy path: a valid login returns an access credential that verifies
/// and carries the identity's role, plus the user summary.
#[sqlx::test(migrations = "../../migrations")]
async fn test_login_happy_path(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    let user_id = server.seed_user("alice", "password123", "admin").await?;

    let client = server.client();
    let response = login_response(&server, &client, "alice", "password123").await;

    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["token_type"].as_str(), Some("Bearer"));
    assert!(body["expires_in"].as_u64().unwrap_or(0) > 0);
    assert_eq!(body["user"]["username"].as_str(), Some("alice"));
    assert_eq!(body["user"]["role"].as_str(), Some("admin"));
    assert_eq!(
        body["user"]["user_id"].as_str(),
        Some(user_id.to_string().as_str())
    );

    // The access credential verifies against the server's signing secret
    // and carries the correct role.
    let token = body["access_token"].as_str().expect("access_token present");
    let claims = crypto::verify_access_token(
        token,
        server
            .config()
            .access_token_secret
            .expose_secret()
            .as_bytes(),
    )
    .expect("returned credential should verify");
    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.role, Role::Admin);

    Ok(())
}

/// The refresh credential travels only via Set-Cookie, with the http-only,
/// same-site, path-scoped attributes, and never appears in the JSON body.
#[sqlx::test(migrations = "../../migrations")]
async fn test_login_sets_scoped_refresh_cookie(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    server.seed_user("alice", "password123", "user").await?;

    // Plain client: inspect raw headers instead of a cookie store.
    let client = reqwest::Client::new();
    let response = login_response(&server, &client, "alice", "password123").await;
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|h| h.to_str().ok())
        .expect("login must set the refresh cookie")
        .to_string();

    assert!(set_cookie.starts_with("refresh_token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/api/v1/auth"));

    let body: serde_json::Value = response.json().await?;
    let body_text = body.to_string();
    let cookie_value = set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split('=').nth(1))
        .expect("cookie has a value");
    assert!(
        !body_text.contains(cookie_value),
        "refresh credential must not appear in the response body"
    );

    Ok(())
}

/// Unknown username and wrong password are indistinguishable on the wire.
#[sqlx::test(migrations = "../../migrations")]
async fn test_login_failures_are_uniform(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    server.seed_user("alice", "password123", "user").await?;

    let client = server.client();

    let unknown = login_response(&server, &client, "mallory", "password123").await;
    let unknown_status = unknown.status();
    let unknown_body: serde_json::Value = unknown.json().await?;

    let wrong = login_response(&server, &client, "alice", "not-the-password").await;
    let wrong_status = wrong.status();
    let wrong_body: serde_json::Value = wrong.json().await?;

    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        unknown_body, wrong_body,
        "unknown-user and wrong-password responses must be identical"
    );
    assert_eq!(
        unknown_body["error"]["code"].as_str(),
        Some("INVALID_CREDENTIALS")
    );

    Ok(())
}

/// Logout is idempotent: with no cookie present it still reports success.
#[sqlx::test(migrations = "../../migrations")]
async fn test_logout_without_cookie_succeeds(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/logout", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await?;
    assert!(body["message"].as_str().is_some());

    Ok(())
}

/// Logout clears the cookie (max-age zero removal cookie).
#[sqlx::test(migrations = "../../migrations")]
async fn test_logout_clears_cookie(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    server.seed_user("alice", "password123", "user").await?;

    let client = server.client();
    let login = login_response(&server, &client, "alice", "password123").await;
    assert_eq!(login.status(), StatusCode::OK);

    let response = client
        .post(format!("{}/api/v1/auth/logout", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|h| h.to_str().ok())
        .expect("logout must clear the refresh cookie");
    assert!(set_cookie.starts_with("refresh_token="));
    assert!(set_cookie.contains("Max-Age=0"));

    Ok(())
}
