//! Test utilities for the session service.
//!
//! Provides a real-server harness for end-to-end tests: spawn the service
//! on a random port against a `#[sqlx::test]` pool, seed identities, mint
//! tokens with controlled timestamps.

pub mod server_harness;
