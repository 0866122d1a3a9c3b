//! Identity lookup.
//!
//! The identity table is owned by the registry's provisioning tooling; this
//! core only reads it (plus a best-effort login timestamp). There is
//! deliberately no create/update surface here.

use crate::errors::SessionError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Identity model (maps to users table).
///
/// `role` stays a raw string at this layer; the service parses it into
/// [`crate::models::Role`] when minting claims.
#[derive(Clone, sqlx::FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .field("role", &self.role)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Get an identity by username.
pub async fn get_by_username(pool: &PgPool, username: &str) -> Result<Option<User>, SessionError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT
            user_id, username, password_hash, role,
            is_active, created_at, updated_at, last_login_at
        FROM users
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .map_err(|e| SessionError::Database(format!("Failed to fetch user by username: {}", e)))?;

    Ok(user)
}

/// Get an identity by id.
pub async fn get_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<User>, SessionError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT
            user_id, username, password_hash, role,
            is_active, created_at, updated_at, last_login_at
        FROM users
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| SessionError::Database(format!("Failed to fetch user by id: {}", e)))?;

    Ok(user)
}

/// Update the last_login_at timestamp for an identity.
pub async fn update_last_login(pool: &PgPool, user_id: Uuid) -> Result<(), SessionError> {
    sqlx::query(
        r#"
        UPDATE users
        SET last_login_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|e| SessionError::Database(format!("Failed to update last login: {}", e)))?;

    Ok(())
}
