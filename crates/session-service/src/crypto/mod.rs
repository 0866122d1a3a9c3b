use crate::errors::SessionError;
use crate::models::Role;
use chrono::Utc;
use hmac::{Hmac, Mac};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use uuid::Uuid;

/// Access credential lifetime (1 hour).
pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 3600;

/// Refresh credential lifetime (7 days). Matches the expiry written on the
/// stored refresh record.
pub const REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 3600;

/// Maximum allowed token size in bytes (4KB).
///
/// Tokens larger than this are rejected before any parsing or cryptographic
/// work. Typical tokens here are 300-500 bytes; the cap is a resource
/// exhaustion guard, not a functional limit.
const MAX_TOKEN_SIZE_BYTES: usize = 4096;

/// Bcrypt cost used when hashing passwords for storage.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Well-formed bcrypt hash that matches no password.
///
/// Verified against when a login names an unknown user, so the unknown-user
/// and wrong-password paths cost the same wall-clock time.
pub const DUMMY_PASSWORD_HASH: &str =
    "$2b$12$LQv3c1yqBWVHxkd0LHAkCOYz6TtxMQJqhN8/LewY5GyYqExt7YD3a";

type HmacSha256 = Hmac<Sha256>;

/// Access credential claims.
///
/// Self-contained: a request is authenticated from these fields alone, with
/// no server-side record. The `sub` field is redacted in Debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,        // Subject (user_id)
    pub username: String, // Login name, echoed into the request context
    pub role: Role,       // Authorization role
    pub iat: i64,         // Issued at timestamp
    pub exp: i64,         // Expiration timestamp
}

impl fmt::Debug for AccessClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessClaims")
            .field("sub", &"[REDACTED]")
            .field("username", &self.username)
            .field("role", &self.role)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .finish()
    }
}

/// Refresh credential claims.
///
/// `jti` makes every issued refresh credential distinct, so two credentials
/// for the same user never collide in the record store.
#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid, // Subject (user_id)
    pub jti: Uuid, // Unique token id
    pub iat: i64,  // Issued at timestamp
    pub exp: i64,  // Expiration timestamp
}

impl fmt::Debug for RefreshClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshClaims")
            .field("sub", &"[REDACTED]")
            .field("jti", &self.jti)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .finish()
    }
}

/// Issue an access credential for an authenticated identity.
pub fn issue_access_token(
    user_id: Uuid,
    username: &str,
    role: Role,
    secret: &[u8],
) -> Result<String, SessionError> {
    let now = Utc::now().timestamp();
    let claims = AccessClaims {
        sub: user_id,
        username: username.to_string(),
        role,
        iat: now,
        exp: now + ACCESS_TOKEN_TTL_SECONDS,
    };

    sign_access_claims(&claims, secret)
}

/// Sign explicit access claims.
///
/// Split out from [`issue_access_token`] so tests can mint credentials with
/// arbitrary timestamps.
pub fn sign_access_claims(claims: &AccessClaims, secret: &[u8]) -> Result<String, SessionError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| SessionError::Crypto(format!("Access token signing failed: {}", e)))
}

/// Verify an access credential.
///
/// Distinguishes expiry from every other defect: a token whose only problem
/// is `exp` in the past yields [`SessionError::TokenExpired`], telling the
/// client that a rotation (not a re-login) is the right recovery. Any other
/// failure collapses into a generic `InvalidToken`.
pub fn verify_access_token(token: &str, secret: &[u8]) -> Result<AccessClaims, SessionError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "crypto",
            token_size = token.len(),
            max_size = MAX_TOKEN_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(SessionError::InvalidToken(
            "The access token is invalid".to_string(),
        ));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let token_data =
        decode::<AccessClaims>(token, &DecodingKey::from_secret(secret), &validation).map_err(
            |e| {
                tracing::debug!(target: "crypto", error = %e, "Access token verification failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => SessionError::TokenExpired,
                    _ => SessionError::InvalidToken("The access token is invalid".to_string()),
                }
            },
        )?;

    Ok(token_data.claims)
}

/// Issue a refresh credential for an identity.
pub fn issue_refresh_token(user_id: Uuid, secret: &[u8]) -> Result<String, SessionError> {
    let now = Utc::now().timestamp();
    let claims = RefreshClaims {
        sub: user_id,
        jti: Uuid::new_v4(),
        iat: now,
        exp: now + REFRESH_TOKEN_TTL_SECONDS,
    };

    sign_refresh_claims(&claims, secret)
}

/// Sign explicit refresh claims (test hook, same split as the access side).
pub fn sign_refresh_claims(claims: &RefreshClaims, secret: &[u8]) -> Result<String, SessionError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| SessionError::Crypto(format!("Refresh token signing failed: {}", e)))
}

/// Verify a refresh credential.
///
/// Every failure mode (expired, malformed, bad signature, wrong namespace)
/// collapses into the same `InvalidToken`, so a caller cannot learn which
/// case occurred. The record store makes the final call on whether the
/// credential is still spendable.
pub fn verify_refresh_token(token: &str, secret: &[u8]) -> Result<RefreshClaims, SessionError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        return Err(SessionError::InvalidToken(
            "The refresh token is invalid or expired".to_string(),
        ));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let token_data = decode::<RefreshClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| {
            tracing::debug!(target: "crypto", error = %e, "Refresh token verification failed");
            SessionError::InvalidToken("The refresh token is invalid or expired".to_string())
        })?;

    Ok(token_data.claims)
}

/// Keyed hash of a raw refresh credential for storage at rest.
///
/// HMAC-SHA256 keyed with the refresh signing secret, hex encoded. A stolen
/// table of hashes is useless without the key, and the raw credential is
/// never persisted anywhere.
pub fn hash_refresh_token(raw_token: &str, key: &[u8]) -> Result<String, SessionError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| SessionError::Crypto(format!("Token hashing failed: {}", e)))?;
    mac.update(raw_token.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Hash a password with bcrypt.
pub fn hash_password(password: &str, cost: u32) -> Result<String, SessionError> {
    bcrypt::hash(password, cost)
        .map_err(|e| SessionError::Crypto(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, SessionError> {
    bcrypt::verify(password, hash)
        .map_err(|e| SessionError::Crypto(format!("Password verification failed: {}", e)))
}
