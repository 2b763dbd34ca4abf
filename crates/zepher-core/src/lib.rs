//! Client library for the Zepher access service.
//!
//! `ApiClient` performs authenticated requests, follows the session token the
//! service rotates on every response, and keeps the last `env` snapshot for
//! role and feature-permission checks.
//!
//! ```rust,ignore
//! use zepher_core::{ApiClient, ClientConfig};
//!
//! let mut client = ApiClient::new(ClientConfig::new("app_key_..."))?;
//! let body = client.get("https://zepher.example/api/env", &[]).await?;
//! if client.validate_access("billing,reports", "u") {
//!     // ...
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod export;
pub mod models;

pub use api::{ApiClient, ApiError, Credential, ResponseBody};
pub use auth::{CredentialStore, Session, SessionCookie};
pub use cache::{CacheMode, ResponseCache};
pub use config::{ClientConfig, Settings};
pub use export::EnvExporter;
pub use models::Environment;
