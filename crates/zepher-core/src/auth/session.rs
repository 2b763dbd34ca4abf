use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Name of the cookie holding the session token.
pub const SESSION_COOKIE_NAME: &str = "zepher-jwt";

/// Path the session cookie is scoped to.
pub const SESSION_COOKIE_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    /// `None` means the cookie lives for the session.
    pub expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SessionCookie {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            name: SESSION_COOKIE_NAME.to_string(),
            value: token.into(),
            path: SESSION_COOKIE_PATH.to_string(),
            expires: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires.map(|at| Utc::now() >= at).unwrap_or(false)
    }

    /// Stamp an expiry in the past, the way a browser cookie is deleted.
    pub fn expire(&mut self) {
        self.expires = Some(Utc::now() - Duration::hours(1));
    }
}

/// Session cookie store for one client.
///
/// The in-memory view is authoritative for the running process; when a
/// directory is configured the cookie is mirrored to `zepher-jwt.json` so a
/// later process picks the session up.
pub struct Session {
    dir: Option<PathBuf>,
    pub cookie: Option<SessionCookie>,
}

impl Session {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir, cookie: None }
    }

    /// Load the cookie from disk. Returns true if a live cookie was found.
    pub fn load(&mut self) -> Result<bool> {
        let Some(path) = self.cookie_path() else {
            return Ok(false);
        };
        if path.exists() {
            let contents =
                std::fs::read_to_string(&path).context("Failed to read session cookie file")?;
            let cookie: SessionCookie =
                serde_json::from_str(&contents).context("Failed to parse session cookie file")?;

            if !cookie.is_expired() && !cookie.value.is_empty() {
                self.cookie = Some(cookie);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Save the cookie to disk
    pub fn save(&self) -> Result<()> {
        if let (Some(cookie), Some(path)) = (&self.cookie, self.cookie_path()) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(cookie)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Replace the cookie with a freshly issued token and persist it.
    pub fn set_token(&mut self, token: &str) -> Result<()> {
        self.cookie = Some(SessionCookie::new(token));
        self.save()
    }

    /// Expire the cookie and remove the persisted copy.
    pub fn clear(&mut self) -> Result<()> {
        if let Some(cookie) = self.cookie.as_mut() {
            cookie.expire();
        }
        if let Some(path) = self.cookie_path() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Get the session token if a live cookie is held
    pub fn token(&self) -> Option<&str> {
        self.cookie
            .as_ref()
            .filter(|c| !c.is_expired())
            .map(|c| c.value.as_str())
    }

    pub fn is_established(&self) -> bool {
        self.token().is_some()
    }

    fn cookie_path(&self) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", SESSION_COOKIE_NAME)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cookie_is_session_scoped() {
        let cookie = SessionCookie::new("T");
        assert_eq!(cookie.name, "zepher-jwt");
        assert_eq!(cookie.path, "/");
        assert!(cookie.expires.is_none());
        assert!(!cookie.is_expired());
    }

    #[test]
    fn test_expire() {
        let mut cookie = SessionCookie::new("T");
        cookie.expire();
        assert!(cookie.is_expired());
    }

    #[test]
    fn test_set_token_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(Some(dir.path().to_path_buf()));
        session.set_token("eyJfirst").unwrap();
        session.set_token("eyJsecond").unwrap();

        let mut reloaded = Session::new(Some(dir.path().to_path_buf()));
        assert!(reloaded.load().unwrap());
        assert_eq!(reloaded.token(), Some("eyJsecond"));
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(Some(dir.path().to_path_buf()));
        session.set_token("eyJtoken").unwrap();
        assert!(dir.path().join("zepher-jwt.json").exists());

        session.clear().unwrap();
        assert_eq!(session.token(), None);
        assert!(session.cookie.as_ref().is_some_and(SessionCookie::is_expired));
        assert!(!dir.path().join("zepher-jwt.json").exists());

        let mut reloaded = Session::new(Some(dir.path().to_path_buf()));
        assert!(!reloaded.load().unwrap());
    }

    #[test]
    fn test_expired_cookie_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let mut cookie = SessionCookie::new("eyJold");
        cookie.expire();
        std::fs::write(
            dir.path().join("zepher-jwt.json"),
            serde_json::to_string(&cookie).unwrap(),
        )
        .unwrap();

        let mut session = Session::new(Some(dir.path().to_path_buf()));
        assert!(!session.load().unwrap());
        assert!(!session.is_established());
    }

    #[test]
    fn test_memory_only_session() {
        let mut session = Session::new(None);
        assert!(!session.load().unwrap());
        session.set_token("eyJtoken").unwrap();
        assert_eq!(session.token(), Some("eyJtoken"));
        session.clear().unwrap();
        assert_eq!(session.token(), None);
    }
}
