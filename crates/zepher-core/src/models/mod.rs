//! Data models for Zepher responses.
//!
//! - `Environment`: the access snapshot (`access.roles`, `access.features`)
//!   carried in the `env` field of every response, with the permission check
//!   used by `ApiClient::validate_access`.

pub mod environment;

pub use environment::{Environment, WILDCARD};
