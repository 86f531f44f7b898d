//! REST API client module for the Medical Insight Engine.
//!
//! This module provides the `ApiClient` for the engine's authentication
//! surface: login, registration, token refresh, logout, the current user
//! record, and the health probe.
//!
//! The API uses JWT bearer token authentication obtained through the
//! `/api/auth/login` endpoint.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthResponse, HealthStatus, RegisterResponse};
pub use error::ApiError;
