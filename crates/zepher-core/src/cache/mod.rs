//! Local response store.
//!
//! `ResponseCache` records raw response bodies keyed by the request URI and
//! the bearer token presented with it. Whether recorded bodies are ever
//! served back is decided by `CacheMode`.

pub mod manager;

pub use manager::{CacheError, CacheMode, ResponseCache, CACHE_FILE};
