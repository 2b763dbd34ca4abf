use anyhow::{bail, Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "zepher";

/// Profile used when the caller does not name one.
pub const DEFAULT_PROFILE: &str = "default";

/// Application key for one profile, kept in the OS keychain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStore {
    profile: String,
}

impl CredentialStore {
    /// A blank or missing profile name selects [`DEFAULT_PROFILE`].
    pub fn new(profile: Option<&str>) -> Self {
        let profile = profile
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PROFILE);
        Self {
            profile: profile.to_string(),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.profile)
            .with_context(|| format!("Failed to open keychain entry for '{}'", self.profile))
    }

    pub fn store(&self, app_key: &str) -> Result<()> {
        let app_key = app_key.trim();
        if app_key.is_empty() {
            bail!("Refusing to store an empty application key");
        }
        self.entry()?
            .set_password(app_key)
            .context("Failed to store application key in keychain")
    }

    /// The stored key, or `None` when the profile has none.
    pub fn app_key(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read application key from keychain"),
        }
    }

    /// Remove the stored key. Returns false when there was nothing to remove.
    pub fn forget(&self) -> Result<bool> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(e).context("Failed to delete application key from keychain"),
        }
    }
}
