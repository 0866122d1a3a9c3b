use crate::config::Config;
use crate::crypto;
use crate::errors::SessionError;
use crate::models::{AuthenticatedUser, LoginResponse, MessageResponse, RefreshResponse, UserSummary};
use crate::observability::metrics::record_token_issuance;
use crate::services::token_service;
use axum::{extract::State, Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

/// Cookie carrying the refresh credential.
///
/// Scoped to the auth router so it is only ever sent to login/refresh/logout,
/// http-only so script code cannot read it.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

const AUTH_COOKIE_PATH: &str = "/api/v1/auth";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: SecretString,
}

/// Handle login
///
/// POST /api/v1/auth/login
///
/// Returns the access credential in the body; the refresh credential
/// travels only in the `Set-Cookie` header, never in JSON.
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), SessionError> {
    let start = Instant::now();

    let result = token_service::login(
        &state.pool,
        &state.config,
        &payload.username,
        payload.password.expose_secret(),
    )
    .await;

    let status = if result.is_ok() { "success" } else { "error" };
    record_token_issuance("login", status, start.elapsed());

    let session = result?;
    let jar = jar.add(refresh_cookie(session.refresh_token));

    Ok((
        jar,
        Json(LoginResponse {
            access_token: session.access_token,
            token_type: "Bearer".to_string(),
            expires_in: crypto::ACCESS_TOKEN_TTL_SECONDS as u64,
            user: session.user,
        }),
    ))
}

/// Handle credential rotation
///
/// POST /api/v1/auth/refresh
///
/// The refresh credential comes from the cookie, never from a body. A
/// successful rotation replaces both the access credential and the cookie.
pub async fn handle_refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<RefreshResponse>), SessionError> {
    let start = Instant::now();

    let raw_token = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| {
            SessionError::InvalidToken("The refresh token is invalid or expired".to_string())
        })?;

    let result = token_service::refresh(&state.pool, &state.config, &raw_token).await;

    let status = if result.is_ok() { "success" } else { "error" };
    record_token_issuance("refresh", status, start.elapsed());

    let session = result?;
    let jar = jar.add(refresh_cookie(session.refresh_token));

    Ok((
        jar,
        Json(RefreshResponse {
            access_token: session.access_token,
            token_type: "Bearer".to_string(),
            expires_in: crypto::ACCESS_TOKEN_TTL_SECONDS as u64,
        }),
    ))
}

/// Handle logout
///
/// POST /api/v1/auth/logout
///
/// Idempotent: succeeds with or without a cookie present, and always
/// clears the cookie.
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), SessionError> {
    let raw_token = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string());

    token_service::logout(&state.pool, &state.config, raw_token.as_deref()).await?;

    let jar = jar.remove(removal_cookie());

    Ok((
        jar,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    ))
}

/// Return the authenticated identity
///
/// GET /api/v1/auth/me
pub async fn handle_me(Extension(user): Extension<AuthenticatedUser>) -> Json<UserSummary> {
    Json(UserSummary {
        user_id: user.user_id,
        username: user.username,
        role: user.role,
    })
}

fn refresh_cookie(value: String) -> Cookie<'static> {
    Cookie::build((REFRESH_TOKEN_COOKIE, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path(AUTH_COOKIE_PATH)
        .max_age(time::Duration::seconds(crypto::REFRESH_TOKEN_TTL_SECONDS))
        .build()
}

fn removal_cookie() -> Cookie<'static> {
    Cookie::build((REFRESH_TOKEN_COOKIE, ""))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path(AUTH_COOKIE_PATH)
        .build()
}
