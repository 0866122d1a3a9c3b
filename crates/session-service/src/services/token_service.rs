//! Session issuance and refresh rotation.
//!
//! Login mints an access/refresh credential pair and durably records the
//! refresh credential's hash. Refresh spends the presented credential
//! atomically and issues a replacement pair, so every refresh credential is
//! single-use. Logout revokes best-effort and always succeeds.

use crate::config::Config;
use crate::crypto;
use crate::errors::SessionError;
use crate::models::{Role, UserSummary};
use crate::observability::hash_for_correlation;
use crate::observability::metrics::{record_refresh_rotation, record_revocation};
use crate::repositories::{refresh_tokens, users};
use common::secret::ExposeSecret;
use sqlx::PgPool;

/// A freshly issued credential pair plus the identity it belongs to.
///
/// The refresh token is raw here for exactly as long as it takes the
/// handler to move it into the cookie; only its hash ever reaches storage.
#[derive(Clone)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSummary,
}

impl std::fmt::Debug for IssuedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// Authenticate an identity and issue a credential pair.
///
/// # Steps
///
/// 1. Look up the identity by username
/// 2. Verify the password (dummy hash when the user is unknown, so both
///    failure paths cost the same and the response never reveals which
///    field was wrong)
/// 3. Mint the access credential and a fresh refresh credential
/// 4. Persist the refresh record; a persistence failure fails the whole
///    login, an access credential must never outlive its rotation record
/// 5. Hand both credentials to the caller
pub async fn login(
    pool: &PgPool,
    config: &Config,
    username: &str,
    password: &str,
) -> Result<IssuedSession, SessionError> {
    let user = users::get_by_username(pool, username).await?;

    // Always run bcrypt so unknown-user and wrong-password take the same time.
    let hash_to_verify = match &user {
        Some(u) => u.password_hash.as_str(),
        None => crypto::DUMMY_PASSWORD_HASH,
    };
    let password_valid = crypto::verify_password(password, hash_to_verify)?;

    let user = user.ok_or(SessionError::InvalidCredentials)?;
    if !user.is_active || !password_valid {
        tracing::debug!(username = %username, "Login rejected");
        return Err(SessionError::InvalidCredentials);
    }

    let session = issue_session_for(pool, config, &user).await?;

    // Best-effort bookkeeping; a failed timestamp must not fail the login.
    if let Err(e) = users::update_last_login(pool, user.user_id).await {
        tracing::warn!(error = %e, "Failed to update last login timestamp");
    }

    tracing::info!(username = %user.username, "Session established");

    Ok(session)
}

/// Rotate a refresh credential.
///
/// # Steps
///
/// 1. Verify the presented credential's signature and expiry
/// 2. Atomically spend the matching refresh record; losing that race (or
///    presenting a rotated/revoked/expired/unknown credential) is one
///    indistinguishable `InvalidToken`
/// 3. Re-load the identity; a deleted or deactivated account ends the
///    session
/// 4. Mint and persist a replacement pair
///
/// After step 2 the old credential is permanently unusable: a replayed copy
/// fails on its next use.
pub async fn refresh(
    pool: &PgPool,
    config: &Config,
    raw_refresh_token: &str,
) -> Result<IssuedSession, SessionError> {
    let refresh_secret = config.refresh_token_secret.expose_secret().as_bytes();

    let claims = crypto::verify_refresh_token(raw_refresh_token, refresh_secret)?;
    let token_hash = crypto::hash_refresh_token(raw_refresh_token, refresh_secret)?;

    let spent = refresh_tokens::revoke_if_valid(pool, claims.sub, &token_hash)
        .await
        .map_err(|e| {
            record_refresh_rotation("error");
            e
        })?;

    if !spent {
        record_refresh_rotation("rejected");
        tracing::debug!(
            token = %hash_for_correlation(&token_hash),
            "Rotation rejected: no live refresh record"
        );
        return Err(SessionError::InvalidToken(
            "The refresh token is invalid or expired".to_string(),
        ));
    }
    record_revocation("rotation");

    let user = users::get_by_id(pool, claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| {
            tracing::debug!("Rotation rejected: identity gone or inactive");
            SessionError::InvalidToken("The refresh token is invalid or expired".to_string())
        })?;

    let session = issue_session_for(pool, config, &user).await?;

    record_refresh_rotation("rotated");
    tracing::debug!(
        username = %user.username,
        old_token = %hash_for_correlation(&token_hash),
        "Refresh credential rotated"
    );

    Ok(session)
}

/// Revoke the refresh credential presented at logout.
///
/// Idempotent by design: a missing, malformed, already-rotated, or
/// already-revoked credential still counts as logged out. Store failures
/// are logged but not surfaced; the client clears its state either way.
pub async fn logout(
    pool: &PgPool,
    config: &Config,
    raw_refresh_token: Option<&str>,
) -> Result<(), SessionError> {
    let Some(raw) = raw_refresh_token else {
        tracing::debug!("Logout with no refresh cookie; already logged out");
        return Ok(());
    };

    let refresh_secret = config.refresh_token_secret.expose_secret().as_bytes();

    let Ok(claims) = crypto::verify_refresh_token(raw, refresh_secret) else {
        tracing::debug!("Logout with unverifiable refresh cookie");
        return Ok(());
    };

    let token_hash = crypto::hash_refresh_token(raw, refresh_secret)?;
    match refresh_tokens::revoke_if_valid(pool, claims.sub, &token_hash).await {
        Ok(true) => {
            record_revocation("logout");
            tracing::info!(
                token = %hash_for_correlation(&token_hash),
                "Refresh credential revoked on logout"
            );
        }
        Ok(false) => {
            tracing::debug!("Logout found no live refresh record");
        }
        Err(e) => {
            // Best-effort: the cookie is cleared regardless.
            tracing::warn!(error = %e, "Failed to revoke refresh token on logout");
        }
    }

    Ok(())
}

/// Mint a credential pair for a verified identity and persist the refresh
/// record.
async fn issue_session_for(
    pool: &PgPool,
    config: &Config,
    user: &users::User,
) -> Result<IssuedSession, SessionError> {
    let role: Role = user.role.parse().map_err(|e| {
        tracing::error!(username = %user.username, error = %e, "Stored role is unparseable");
        SessionError::Internal
    })?;

    let access_secret = config.access_token_secret.expose_secret().as_bytes();
    let refresh_secret = config.refresh_token_secret.expose_secret().as_bytes();

    let access_token = crypto::issue_access_token(user.user_id, &user.username, role, access_secret)?;
    let refresh_token = crypto::issue_refresh_token(user.user_id, refresh_secret)?;
    let token_hash = crypto::hash_refresh_token(&refresh_token, refresh_secret)?;

    // The refresh record must land before any credential leaves the
    // service; otherwise the client holds a session it can never renew.
    refresh_tokens::store(pool, user.user_id, &token_hash)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to persist refresh record");
            SessionError::TokenStoreFailed
        })?;

    Ok(IssuedSession {
        access_token,
        refresh_token,
        user: UserSummary {
            user_id: user.user_id,
            username: user.username.clone(),
            role,
        },
    })
}
