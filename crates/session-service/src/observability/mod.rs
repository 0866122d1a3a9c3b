//! Observability for the session service.
//!
//! Instrumentation never logs credentials or hashes in full: sensitive
//! values are reduced to a short correlation hash before they reach a log
//! line.

pub mod metrics;

use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars).
///
/// Used for values like the refresh-record hash that need correlation
/// across rotation and revocation events without appearing in plaintext.
/// Not a security boundary, only a logging hygiene tool.
pub fn hash_for_correlation(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    hex::encode(result.iter().take(4).copied().collect::<Vec<u8>>())
}
