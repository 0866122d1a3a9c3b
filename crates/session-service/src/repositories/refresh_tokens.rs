//! Refresh record store.
//!
//! One row per issued refresh credential, holding only a keyed hash of the
//! raw secret. Rows are never deleted: rotation and logout mark them
//! revoked, and expiry alone makes the rest unusable. The whole
//! double-spend story rests on [`revoke_if_valid`]'s single conditional
//! UPDATE.

use crate::errors::SessionError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Refresh record model (maps to refresh_tokens table).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// Persist a new refresh record.
///
/// The row is written with a 7-day expiry matching the credential's own
/// `exp`. Exactly one row must be affected; anything else is a persistence
/// failure the caller must treat as fatal for the login or rotation in
/// progress.
pub async fn store(pool: &PgPool, user_id: Uuid, token_hash: &str) -> Result<(), SessionError> {
    let result = sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + INTERVAL '7 days')
        "#,
    )
    .bind(user_id)
    .bind(token_hash)
    .execute(pool)
    .await
    .map_err(|e| SessionError::Database(format!("Failed to store refresh token: {}", e)))?;

    if result.rows_affected() != 1 {
        return Err(SessionError::Database(format!(
            "Refresh token insert affected {} rows",
            result.rows_affected()
        )));
    }

    Ok(())
}

/// Atomically spend a refresh record.
///
/// Flips `revoked` on the unique live row matching `(user_id, token_hash)`
/// and reports whether exactly one row was updated. Two concurrent calls
/// presenting the same credential race on this one statement: the database
/// lets a single caller observe `revoked = FALSE -> TRUE`, the other sees
/// zero rows and must fail. Covers already-rotated, revoked-by-logout,
/// expired, and never-issued alike; callers cannot tell which case they hit.
pub async fn revoke_if_valid(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &str,
) -> Result<bool, SessionError> {
    let result = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = TRUE
        WHERE user_id = $1
          AND token_hash = $2
          AND revoked = FALSE
          AND expires_at > NOW()
        "#,
    )
    .bind(user_id)
    .bind(token_hash)
    .execute(pool)
    .await
    .map_err(|e| SessionError::Database(format!("Failed to revoke refresh token: {}", e)))?;

    Ok(result.rows_affected() == 1)
}
