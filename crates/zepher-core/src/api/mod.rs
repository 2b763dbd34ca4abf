//! HTTP client module for the Zepher access service.
//!
//! This module provides the `ApiClient` for issuing authenticated GET, POST
//! and DELETE requests against caller-supplied URIs.
//!
//! Requests carry `Authorization: Bearer <token>`, where the token is the
//! `zepher-jwt` session cookie once the service has issued one and the
//! configured application key before that.

pub mod client;
pub mod error;

pub use client::{ApiClient, Credential, ResponseBody};
pub use error::{ApiError, SESSION_EXPIRED_CODE};
