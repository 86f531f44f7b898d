//! Data models for Medical Insight Engine entities.
//!
//! Only the account-facing types live here: the engine's document and
//! analytics payloads are not part of this client.

pub mod user;

pub use user::{User, UserRole};
