//! E2E tests for refresh credential rotation.
//!
//! Covers the single-use property of refresh credentials over the real
//! wire: rotation, replay of a spent credential, races between concurrent
//! rotations, and logout-revocation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use reqwest::StatusCode;
use serde_json::json;
use session_test_utils::server_harness::TestSessionServer;
use sqlx::PgPool;

/// Log in with a plain client and return the raw refresh cookie value.
async fn login_and_capture_cookie(
    server: &TestSessionServer,
    username: &str,
    password: &str,
) -> String {
    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/login", server.url()))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await
        .expect("login request should send");

    assert_eq!(response.status(), StatusCode::OK);

    response
        .headers()
        .get("set-cookie")
        .and_then(|h| h.to_str().ok())
        .and_then(|c| c.split(';').next())
        .and_then(|pair| pair.split('=').nth(1))
        .expect("login must set the refresh cookie")
        .to_string()
}

async fn refresh_with_cookie(server: &TestSessionServer, cookie_value: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/api/v1/auth/refresh", server.url()))
        .header("cookie", format!("refresh_token={cookie_value}"))
        .send()
        .await
        .expect("refresh request should send")
}

/// Happy path with a cookie-holding client: refresh yields a new access
/// credential and rotates the cookie.
#[sqlx::test(migrations = "../../migrations")]
async fn test_refresh_rotates_credentials(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    server.seed_user("alice", "password123", "user").await?;

    let client = server.client();
    let login = client
        .post(format!("{}/api/v1/auth/login", server.url()))
        .json(&json!({"username": "alice", "password": "password123"}))
        .send()
        .await?;
    assert_eq!(login.status(), StatusCode::OK);
    let login_body: serde_json::Value = login.json().await?;

    let refresh = client
        .post(format!("{}/api/v1/auth/refresh", server.url()))
        .send()
        .await?;
    assert_eq!(refresh.status(), StatusCode::OK);

    let set_cookie = refresh
        .headers()
        .get("set-cookie")
        .and_then(|h| h.to_str().ok())
        .expect("rotation must set a replacement cookie")
        .to_string();
    assert!(set_cookie.starts_with("refresh_token="));
    assert!(set_cookie.contains("Path=/api/v1/auth"));

    let refresh_body: serde_json::Value = refresh.json().await?;
    let new_token = refresh_body["access_token"].as_str().expect("access_token");
    assert_ne!(
        Some(new_token),
        login_body["access_token"].as_str(),
        "rotation must mint a fresh access credential"
    );

    Ok(())
}

/// A spent refresh credential is permanently unusable.
#[sqlx::test(migrations = "../../migrations")]
async fn test_spent_credential_replay_rejected(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    server.seed_user("alice", "password123", "user").await?;

    let old_cookie = login_and_capture_cookie(&server, "alice", "password123").await;

    let first = refresh_with_cookie(&server, &old_cookie).await;
    assert_eq!(first.status(), StatusCode::OK);

    // Replay of the now-rotated credential: collapsed into INVALID_TOKEN,
    // indistinguishable from expiry or revocation.
    let replay = refresh_with_cookie(&server, &old_cookie).await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = replay.json().await?;
    assert_eq!(body["error"]["code"].as_str(), Some("INVALID_TOKEN"));

    Ok(())
}

/// Two rotations racing on the same credential over the wire: exactly one
/// succeeds, the other observes the already-revoked record.
#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_rotations_single_winner(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    server.seed_user("alice", "password123", "user").await?;

    let cookie = login_and_capture_cookie(&server, "alice", "password123").await;

    let (a, b) = tokio::join!(
        refresh_with_cookie(&server, &cookie),
        refresh_with_cookie(&server, &cookie),
    );

    let statuses = [a.status(), b.status()];
    let successes = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let failures = statuses
        .iter()
        .filter(|s| **s == StatusCode::UNAUTHORIZED)
        .count();

    assert_eq!(successes, 1, "exactly one rotation may win, got {statuses:?}");
    assert_eq!(failures, 1, "the loser must fail, got {statuses:?}");

    Ok(())
}

/// Refresh without a cookie is a 401, not a 400: the absence of a
/// credential reads the same as an invalid one.
#[sqlx::test(migrations = "../../migrations")]
async fn test_refresh_without_cookie_rejected(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/refresh", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"].as_str(), Some("INVALID_TOKEN"));

    Ok(())
}

/// Logout revokes the stored record: the same cookie then fails rotation.
#[sqlx::test(migrations = "../../migrations")]
async fn test_logout_then_refresh_rejected(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    server.seed_user("alice", "password123", "user").await?;

    let cookie = login_and_capture_cookie(&server, "alice", "password123").await;

    let logout = reqwest::Client::new()
        .post(format!("{}/api/v1/auth/logout", server.url()))
        .header("cookie", format!("refresh_token={cookie}"))
        .send()
        .await?;
    assert_eq!(logout.status(), StatusCode::OK);

    let refresh = refresh_with_cookie(&server, &cookie).await;
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

/// A deactivated identity can no longer rotate, even with a live record.
#[sqlx::test(migrations = "../../migrations")]
async fn test_deactivated_identity_cannot_rotate(pool: PgPool) -> Result<(), anyhow::Error> {
    let server = TestSessionServer::spawn(pool).await?;
    let user_id = server.seed_user("alice", "password123", "user").await?;

    let cookie = login_and_capture_cookie(&server, "alice", "password123").await;
    server.deactivate_user(user_id).await?;

    let refresh = refresh_with_cookie(&server, &cookie).await;
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}
