//! Request-time authentication gate.
//!
//! Every protected request passes through [`require_auth`], which verifies
//! the Bearer access credential and attaches the authenticated identity to
//! the request. Expiry is the one failure reported distinctly
//! (`TOKEN_EXPIRED`), because it tells the client that a rotation, not a
//! re-login, is the right recovery. Admin-only routes additionally layer
//! [`require_admin`].

use crate::crypto;
use crate::errors::SessionError;
use crate::handlers::auth_handler::AppState;
use crate::models::{AuthenticatedUser, Role};
use crate::observability::metrics::record_token_validation;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use common::secret::ExposeSecret;
use std::sync::Arc;

/// Authenticate the request from its Bearer access credential.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, SessionError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            record_token_validation("error", Some("missing"));
            SessionError::InvalidToken("Missing Authorization header".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        record_token_validation("error", Some("missing"));
        SessionError::InvalidToken("Invalid Authorization header format".to_string())
    })?;

    let claims = crypto::verify_access_token(
        token,
        state.config.access_token_secret.expose_secret().as_bytes(),
    )
    .map_err(|e| {
        let category = match e {
            SessionError::TokenExpired => "expired",
            _ => "invalid",
        };
        record_token_validation("error", Some(category));
        e
    })?;

    record_token_validation("success", None);

    req.extensions_mut().insert(AuthenticatedUser {
        user_id: claims.sub,
        username: claims.username,
        role: claims.role,
    });

    Ok(next.run(req).await)
}

/// Reject authenticated requests whose role is not admin.
///
/// Must be layered inside [`require_auth`]; a request that reaches this
/// gate without an identity attached is a routing bug, not a client error.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, SessionError> {
    let user = req
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or(SessionError::Internal)?;

    if user.role != Role::Admin {
        tracing::debug!(username = %user.username, "Admin gate rejected request");
        return Err(SessionError::Forbidden);
    }

    Ok(next.run(req).await)
}
