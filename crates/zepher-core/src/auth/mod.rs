//! Credentials and session state.
//!
//! This module provides:
//! - `Session`: the `zepher-jwt` session cookie, mirrored to disk
//! - `CredentialStore`: application keys in the OS keychain via keyring

pub mod credentials;
pub mod session;

pub use credentials::{CredentialStore, DEFAULT_PROFILE};
pub use session::{Session, SessionCookie, SESSION_COOKIE_NAME, SESSION_COOKIE_PATH};
