//! Metrics definitions for the session service.
//!
//! All metrics follow Prometheus naming conventions with a `session_`
//! prefix and `_total` / `_seconds` suffixes.
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `flow`: 2 values (login, refresh)
//! - `status`: 2 values (success, error)
//! - `outcome`: 3 values (rotated, rejected, error)
//! - `error_category`: 3 values (expired, invalid, missing)

use metrics::{counter, histogram};
use std::time::Duration;

/// Record credential issuance duration and outcome.
///
/// Metric: `session_token_issuance_duration_seconds`,
/// `session_token_issuance_total`
/// Labels: `flow` (login | refresh), `status`
pub fn record_token_issuance(flow: &str, status: &str, duration: Duration) {
    histogram!("session_token_issuance_duration_seconds", "flow" => flow.to_string(), "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("session_token_issuance_total", "flow" => flow.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record an access-credential validation result at the auth gate.
///
/// Metric: `session_token_validations_total`
/// Labels: `status`, `error_category`
pub fn record_token_validation(status: &str, error_category: Option<&str>) {
    let category = error_category.unwrap_or("none");
    counter!("session_token_validations_total", "status" => status.to_string(), "error_category" => category.to_string())
        .increment(1);
}

/// Record the outcome of a rotation attempt against the record store.
///
/// Metric: `session_refresh_rotations_total`
/// Labels: `outcome` (rotated | rejected | error)
pub fn record_refresh_rotation(outcome: &str) {
    counter!("session_refresh_rotations_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a revocation event.
///
/// Metric: `session_revocations_total`
/// Labels: `source` (rotation | logout)
pub fn record_revocation(source: &str) {
    counter!("session_revocations_total", "source" => source.to_string()).increment(1);
}
