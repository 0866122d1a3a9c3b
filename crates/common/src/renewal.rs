//! Device registry API client with serialized credential renewal.
//!
//! Wraps `reqwest` with the session wire contract: a short-lived access
//! credential sent as a Bearer header, and a long-lived refresh credential
//! held only by the HTTP cookie store (the server sets it http-only and
//! path-scoped; this client never sees or sends it in a body).
//!
//! # Renewal coordination
//!
//! When a request fails with 401, the client triggers at most one rotation
//! call per expiry event. The coordinator is an explicit state machine:
//!
//! - `renewing == false`: the failing caller becomes the leader, flips the
//!   flag and calls the rotation endpoint.
//! - `renewing == true`: the failing caller parks a oneshot waiter in the
//!   queue instead of issuing a second rotation call. A herd of requests
//!   expiring together therefore produces exactly one rotation on the wire.
//! - Leader success: the new access credential is stored, every waiter is
//!   resolved with it, and each caller replays its original request once.
//! - Leader failure: every waiter is rejected, the held credential is
//!   cleared, and the client is logged out. A failed rotation is terminal
//!   for the session; it is never retried automatically.
//!
//! # Security
//!
//! - Access credentials are stored as `SecretString` (never logged)
//! - The refresh credential lives only in the cookie store
//! - HTTP timeouts prevent hanging connections

use crate::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

// =============================================================================
// Constants
// =============================================================================

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for the HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced by the registry client.
///
/// Cloneable so a single rotation failure can be fanned out to every
/// parked waiter.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// HTTP client could not be built.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure (connect, timeout, read).
    #[error("HTTP client error: {0}")]
    Http(String),

    /// Login rejected by the service (401).
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Rotation failed; the session is over and a new login is required.
    #[error("Session expired")]
    SessionExpired,

    /// A request was attempted with no session established.
    #[error("Not logged in")]
    LoggedOut,

    /// The service answered with a non-auth error status.
    #[error("API error: status {status}, code {code}")]
    Api { status: u16, code: String },

    /// Response body did not match the wire contract.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the registry client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Registry endpoint URL (e.g., `http://localhost:8084`).
    pub base_url: String,

    /// HTTP request timeout.
    pub http_timeout: Duration,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new configuration with default timeouts.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// Authenticated identity as reported by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
}

#[derive(Deserialize)]
struct LoginResponseBody {
    access_token: String,
    user: SessionUser,
}

impl fmt::Debug for LoginResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginResponseBody")
            .field("access_token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Deserialize)]
struct RefreshResponseBody {
    access_token: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: String,
}

// =============================================================================
// Renewal State
// =============================================================================

/// Client-held session state behind one lock.
///
/// `renewing` and the waiter queue implement the single-flight rotation;
/// `access_token` is `None` exactly when the client is logged out.
struct ClientState {
    access_token: Option<SecretString>,
    renewing: bool,
    waiters: Vec<oneshot::Sender<Result<SecretString, ClientError>>>,
}

// =============================================================================
// Client
// =============================================================================

/// Registry API client.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    state: Mutex<ClientState>,
}

impl fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl RegistryClient {
    /// Build a client from configuration.
    ///
    /// The underlying HTTP client carries a cookie store so the refresh
    /// credential set at login is replayed to the rotation endpoint without
    /// this code ever touching it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                ClientError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            base_url: config.base_url,
            state: Mutex::new(ClientState {
                access_token: None,
                renewing: false,
                waiters: Vec::new(),
            }),
        })
    }

    /// Whether the client currently holds an access credential.
    pub async fn is_logged_in(&self) -> bool {
        self.state.lock().await.access_token.is_some()
    }

    /// Authenticate and establish a session.
    ///
    /// On success the access credential is stored for subsequent requests
    /// and the refresh credential lands in the cookie store via the
    /// service's `Set-Cookie`.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidCredentials` - username/password rejected
    /// - `ClientError::Http` / `ClientError::InvalidResponse` - transport or
    ///   contract failures
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<SessionUser, ClientError> {
        let url = format!("{}/api/v1/auth/login", self.base_url);
        let body = serde_json::json!({
            "username": username,
            "password": password.expose_secret(),
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(ClientError::Http(format!("Unexpected status: {status}")));
        }

        let body: LoginResponseBody = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        let mut state = self.state.lock().await;
        state.access_token = Some(SecretString::from(body.access_token));
        state.renewing = false;

        debug!(
            target: "common.renewal",
            username = %body.user.username,
            "Session established"
        );

        Ok(body.user)
    }

    /// End the session.
    ///
    /// The server-side revoke is best-effort: local state is cleared even if
    /// the request fails or times out, because the user asked to log out.
    pub async fn logout(&self) {
        let url = format!("{}/api/v1/auth/logout", self.base_url);
        match self.http.post(&url).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(
                    target: "common.renewal",
                    status = %response.status(),
                    "Logout rejected by service; clearing local session anyway"
                );
            }
            Err(e) => {
                warn!(
                    target: "common.renewal",
                    error = %e,
                    "Logout request failed; clearing local session anyway"
                );
            }
            Ok(_) => {}
        }

        let mut state = self.state.lock().await;
        state.access_token = None;
    }

    /// Fetch the authenticated identity from the service.
    pub async fn me(&self) -> Result<SessionUser, ClientError> {
        let value = self.get_json("/api/v1/auth/me").await?;
        serde_json::from_value(value).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// GET a JSON resource, renewing the access credential once if needed.
    ///
    /// On a 401 the request triggers (or joins) a rotation and replays
    /// exactly once with the fresh credential. A second 401 after replay is
    /// surfaced to the caller.
    ///
    /// # Errors
    ///
    /// - `ClientError::LoggedOut` - no session established
    /// - `ClientError::SessionExpired` - rotation failed; session is over
    /// - `ClientError::Api` - non-auth error status from the service
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, ClientError> {
        let token = self
            .current_token()
            .await
            .ok_or(ClientError::LoggedOut)?;

        let response = self.send_get(path, &token).await?;
        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Self::parse_json_response(response).await;
        }

        // Credential rejected mid-session: renew once, replay once.
        let fresh = self.renew_access_token().await?;
        let response = self.send_get(path, &fresh).await?;
        Self::parse_json_response(response).await
    }

    async fn current_token(&self) -> Option<SecretString> {
        self.state.lock().await.access_token.clone()
    }

    async fn send_get(
        &self,
        path: &str,
        token: &SecretString,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        self.http
            .get(&url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))
    }

    async fn parse_json_response(
        response: reqwest::Response,
    ) -> Result<serde_json::Value, ClientError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ClientError::InvalidResponse(e.to_string()));
        }

        let code = response
            .json::<ErrorEnvelope>()
            .await
            .map(|envelope| envelope.error.code)
            .unwrap_or_default();

        Err(ClientError::Api {
            status: status.as_u16(),
            code,
        })
    }

    /// Obtain a fresh access credential, coordinating with concurrent callers.
    ///
    /// At most one rotation call is in flight at a time. Callers that lose
    /// the race park a waiter and receive whatever the leader's rotation
    /// produced.
    async fn renew_access_token(&self) -> Result<SecretString, ClientError> {
        let waiter = {
            let mut state = self.state.lock().await;
            if state.renewing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Some(rx)
            } else {
                state.renewing = true;
                None
            }
        };

        if let Some(rx) = waiter {
            debug!(target: "common.renewal", "Renewal in flight, queueing");
            return rx.await.map_err(|_| ClientError::SessionExpired)?;
        }

        let result = self.call_refresh().await;

        let mut state = self.state.lock().await;
        state.renewing = false;
        let waiters = std::mem::take(&mut state.waiters);

        match result {
            Ok(token) => {
                state.access_token = Some(token.clone());
                drop(state);
                debug!(
                    target: "common.renewal",
                    waiters = waiters.len(),
                    "Access credential renewed"
                );
                for waiter in waiters {
                    let _ = waiter.send(Ok(token.clone()));
                }
                Ok(token)
            }
            Err(e) => {
                // Terminal: the session is unrecoverable without a new login.
                state.access_token = None;
                drop(state);
                warn!(
                    target: "common.renewal",
                    error = %e,
                    "Renewal failed, session closed"
                );
                for waiter in waiters {
                    let _ = waiter.send(Err(e.clone()));
                }
                Err(e)
            }
        }
    }

    /// Call the rotation endpoint.
    ///
    /// The refresh credential is supplied by the cookie store; the request
    /// carries no body.
    async fn call_refresh(&self) -> Result<SecretString, ClientError> {
        let url = format!("{}/api/v1/auth/refresh", self.base_url);

        debug!(target: "common.renewal", "Requesting credential rotation");

        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: RefreshResponseBody = response
                .json()
                .await
                .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
            Ok(SecretString::from(body.access_token))
        } else if status.as_u16() == 401 || status.as_u16() == 400 {
            warn!(
                target: "common.renewal",
                status = %status,
                "Rotation rejected by service"
            );
            Err(ClientError::SessionExpired)
        } else {
            warn!(
                target: "common.renewal",
                status = %status,
                "Unexpected rotation response"
            );
            Err(ClientError::Http(format!(
                "Rotation endpoint returned {status}"
            )))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
