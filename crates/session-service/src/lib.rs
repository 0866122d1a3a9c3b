//! Device Registry Session Service Library
//!
//! This library provides the session token lifecycle for the device
//! registry: credential issuance, refresh rotation, revocation, and the
//! request-time authentication gate.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `crypto` - Credential signing and verification
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `middleware` - Request-time authentication gate
//! - `models` - Data models
//! - `repositories` - Database access layer
//! - `routes` - Router assembly
//! - `services` - Business logic layer

pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
