//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `Session`: token-based session state with persistence and expiry
//! - `CredentialStore`: secure OS-level password storage via keyring
//!
//! Sessions are persisted under configurable storage key names and
//! tokens expire 30 minutes after issuance.

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{Session, SessionData};
