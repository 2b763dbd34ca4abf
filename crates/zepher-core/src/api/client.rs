//! API client for the Zepher access service.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests and tracking the session token and environment the service
//! hands back with every response.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::Session;
use crate::cache::{CacheMode, ResponseCache, CACHE_FILE};
use crate::config::ClientConfig;
use crate::export::EnvExporter;
use crate::models::{Environment, WILDCARD};

use super::error::SESSION_EXPIRED_CODE;
use super::ApiError;

/// Decoded response body.
pub type ResponseBody = Map<String, Value>;

/// Where a response body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Service,
    Cache,
}

/// The credential the next request will present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    AppKey(&'a str),
    SessionToken(&'a str),
}

impl<'a> Credential<'a> {
    pub fn token(&self) -> &'a str {
        match self {
            Credential::AppKey(token) | Credential::SessionToken(token) => *token,
        }
    }
}

/// API client for Zepher.
///
/// Each client owns its session context: the `zepher-jwt` cookie and the
/// environment from the last processed response. Request methods take
/// `&mut self`, so one client never races with itself.
pub struct ApiClient {
    client: Client,
    app_key: String,
    session: Session,
    environment: Environment,
    cache: Option<ResponseCache>,
    cache_mode: CacheMode,
    exporter: Option<EnvExporter>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// Loads a persisted session cookie and opens the response store when a
    /// data directory is configured.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        if config.app_key.trim().is_empty() {
            return Err(ApiError::Config(
                "an application key or session token is required".into(),
            ));
        }

        let mut builder = Client::builder().danger_accept_invalid_certs(!config.verify_tls);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if !config.verify_tls {
            warn!("TLS certificate verification is disabled");
        }
        let client = builder.build()?;

        let mut session = Session::new(config.data_dir.clone());
        match session.load() {
            Ok(true) => debug!("Persisted session cookie loaded"),
            Ok(false) => debug!("No session cookie found"),
            Err(e) => warn!(error = %e, "Ignoring unreadable session cookie"),
        }

        let cache = match (&config.data_dir, config.cache_mode.is_enabled()) {
            (Some(dir), true) => match ResponseCache::open(&dir.join(CACHE_FILE)) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!(error = %e, "Response cache unavailable, continuing without it");
                    None
                }
            },
            _ => None,
        };

        Ok(Self {
            client,
            app_key: config.app_key,
            session,
            environment: Environment::default(),
            cache,
            cache_mode: config.cache_mode,
            exporter: config.export_path.map(EnvExporter::new),
        })
    }

    // ===== Requests =====

    /// GET `uri`, appending `query` as a URL-encoded query string when non-empty.
    pub async fn get(&mut self, uri: &str, query: &[(&str, &str)]) -> Result<ResponseBody, ApiError> {
        let request_uri = build_request_uri(uri, query)?;
        let credential = self.credential();
        let token = credential.token().to_string();

        // The application key always goes to the service so a new session is issued
        if self.cache_mode.serves_reads() && matches!(credential, Credential::SessionToken(_)) {
            if let Some(body) = self.cached_body(&request_uri, &token) {
                debug!(uri = %request_uri, "Serving GET from response cache");
                return self.process_response(&request_uri, &token, &body, Origin::Cache);
            }
        }

        let request = self.client.get(&request_uri);
        self.send("GET", &request_uri, &token, request).await
    }

    /// POST `uri` with `form` as a form-urlencoded body.
    pub async fn post(&mut self, uri: &str, form: &[(&str, &str)]) -> Result<ResponseBody, ApiError> {
        let token = self.credential().token().to_string();
        let request = self.client.post(uri).form(form);
        self.send("POST", uri, &token, request).await
    }

    pub async fn delete(&mut self, uri: &str) -> Result<ResponseBody, ApiError> {
        let token = self.credential().token().to_string();
        let request = self.client.delete(uri);
        self.send("DELETE", uri, &token, request).await
    }

    async fn send(
        &mut self,
        method: &str,
        uri: &str,
        token: &str,
        request: RequestBuilder,
    ) -> Result<ResponseBody, ApiError> {
        debug!(method, uri, "Sending request");

        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(method, uri, status = status.as_u16(), bytes = body.len(), "Response received");
        self.process_response(uri, token, &body, Origin::Service)
    }

    /// Apply a response body to the session context and return it decoded.
    ///
    /// A cached body refreshes the environment but never touches the session
    /// cookie or the store.
    fn process_response(
        &mut self,
        uri: &str,
        token: &str,
        body: &str,
        origin: Origin,
    ) -> Result<ResponseBody, ApiError> {
        let decoded = decode_body(body);

        if let Some((code, message)) = session_error(&decoded) {
            warn!(uri, code, "Service reported an expired session");
            return Err(ApiError::SessionExpired { code, message });
        }

        self.environment = Environment::from_value(decoded.get("env"));

        match (decoded.get("jwt"), origin) {
            (Some(Value::String(jwt)), Origin::Service) if !jwt.is_empty() => {
                if let Err(e) = self.session.set_token(jwt) {
                    warn!(error = %e, "Failed to persist session cookie");
                }
                self.record(uri, token, body);
            }
            (Some(Value::Null) | None, _) | (_, Origin::Cache) => {}
            (Some(_), Origin::Service) => {
                warn!(uri, "Ignoring jwt field that is not a non-empty string")
            }
        }

        if let Some(ref exporter) = self.exporter {
            if let Err(e) = exporter.write(&self.environment) {
                warn!(error = %e, "Failed to export environment");
            }
        }

        Ok(decoded)
    }

    fn record(&self, uri: &str, token: &str, body: &str) {
        if let Some(ref cache) = self.cache {
            if let Err(e) = cache.store(uri, token, body) {
                warn!(uri, error = %e, "Failed to record response");
            }
        }
    }

    fn cached_body(&self, uri: &str, token: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        match cache.lookup(uri, token) {
            Ok(body) => body,
            Err(e) => {
                warn!(uri, error = %e, "Response cache lookup failed");
                None
            }
        }
    }

    // ===== Session =====

    /// The session cookie when one is held, otherwise the application key.
    pub fn credential(&self) -> Credential<'_> {
        match self.session.token() {
            Some(token) => Credential::SessionToken(token),
            None => Credential::AppKey(&self.app_key),
        }
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session.token()
    }

    /// Drop the session cookie so the next request presents the application key.
    pub fn logout(&mut self) -> Result<(), ApiError> {
        self.session
            .clear()
            .map_err(|e| ApiError::Session(format!("{:#}", e)))?;
        info!("Session cookie cleared");
        Ok(())
    }

    // ===== Environment =====

    /// Environment from the last processed response; empty before the first.
    pub fn env(&self) -> &Environment {
        &self.environment
    }

    /// Role id → role title.
    pub fn roles(&self) -> BTreeMap<String, String> {
        self.environment.roles()
    }

    /// Feature name → permission string.
    pub fn features(&self) -> BTreeMap<String, String> {
        self.environment.features()
    }

    /// See [`Environment::validate_access`].
    pub fn validate_access(&self, features: &str, permissions: &str) -> bool {
        self.environment.validate_access(features, permissions)
    }

    /// `validate_access` with any permission accepted.
    pub fn validate_any_access(&self, features: &str) -> bool {
        self.environment.validate_access(features, WILDCARD)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("session_established", &self.session.is_established())
            .field("cache_mode", &self.cache_mode)
            .field("export_path", &self.exporter.as_ref().map(|e| e.path()))
            .finish_non_exhaustive()
    }
}

/// Append `query` to `uri`, leaving `uri` untouched when there is nothing to add.
fn build_request_uri(uri: &str, query: &[(&str, &str)]) -> Result<String, ApiError> {
    if query.is_empty() {
        return Ok(uri.to_string());
    }
    let mut url = Url::parse(uri).map_err(|source| ApiError::InvalidUri {
        uri: uri.to_string(),
        source,
    })?;
    url.query_pairs_mut().extend_pairs(query);
    Ok(url.into())
}

/// Decode a body into a mapping; anything that isn't a JSON object is empty.
fn decode_body(body: &str) -> ResponseBody {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            debug!("Response body is not a JSON object");
            Map::new()
        }
        Err(e) => {
            let excerpt = ApiError::truncate_body(body);
            warn!(error = %e, body = %excerpt, "Malformed JSON response");
            Map::new()
        }
    }
}

/// `(code, message)` when the body reports an expired session.
fn session_error(body: &ResponseBody) -> Option<(i64, String)> {
    let error = body.get("error")?.as_object()?;
    let code = match error.get("code")? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if code != SESSION_EXPIRED_CODE {
        return None;
    }
    let message = match error.get("message") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Some((code, message))
}
