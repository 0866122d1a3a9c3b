use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Minimum length for a signing secret, in bytes.
///
/// HS256 keys shorter than the hash output weaken the MAC; 32 bytes keeps
/// the full 256-bit strength.
pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Signing secret for access credentials.
    pub access_token_secret: SecretString,
    /// Signing secret for refresh credentials. Must differ from the access
    /// secret so a credential from one namespace cannot be replayed in the
    /// other.
    pub refresh_token_secret: SecretString,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("bind_address", &self.bind_address)
            .field("access_token_secret", &"[REDACTED]")
            .field("refresh_token_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Signing secret {0} is too short (minimum {MIN_SECRET_LENGTH} bytes)")]
    SecretTooShort(String),

    #[error("Access and refresh signing secrets must be distinct")]
    SecretsNotDistinct,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8084".to_string());

        let access_token_secret = require_secret(vars, "ACCESS_TOKEN_SECRET")?;
        let refresh_token_secret = require_secret(vars, "REFRESH_TOKEN_SECRET")?;

        if access_token_secret.expose_secret() == refresh_token_secret.expose_secret() {
            return Err(ConfigError::SecretsNotDistinct);
        }

        Ok(Config {
            database_url,
            bind_address,
            access_token_secret,
            refresh_token_secret,
        })
    }
}

fn require_secret(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<SecretString, ConfigError> {
    let value = vars
        .get(name)
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))?;

    if value.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::SecretTooShort(name.to_string()));
    }

    Ok(SecretString::from(value.clone()))
}
