//! # API Shared
//!
//! Shared definitions for the clinic notification APIs.
//!
//! Contains:
//! - JSON request/response types with OpenAPI schemas (`types` module)
//! - Shared services like `HealthService`
//! - API-key authentication used to gate admin endpoints
//!
//! Used by `api-rest` and the `clinic-run` binary.

pub mod auth;
pub mod health;
pub mod types;

pub use auth::{validate_api_key, AuthError};
pub use health::HealthService;
pub use types::*;
