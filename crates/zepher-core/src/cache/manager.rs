//! Response store backed by redb.
//!
//! One table, `responses`, keyed by `(request URI, bearer token)` with the raw
//! response body as value. Recording a response for a URI replaces the rows
//! stored for that URI under earlier tokens, so the store holds at most one
//! row per URI.
//!
//! redb locks its file for the lifetime of a `Database`, so every
//! `ResponseCache` opened on the same path in this process shares one handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// File name of the store inside the client's data directory.
pub const CACHE_FILE: &str = "responses.redb";

const RESPONSES: TableDefinition<(&str, &str), &str> = TableDefinition::new("responses");

/// Open databases by canonical path.
static OPEN_STORES: OnceLock<Mutex<HashMap<PathBuf, Weak<Database>>>> = OnceLock::new();

/// How the client uses the response store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// No store is opened.
    Off,
    /// Responses carrying a session token are recorded but never served.
    #[default]
    WriteOnly,
    /// Recorded GET responses are served for a matching URI and session token.
    ReadThrough,
}

impl CacheMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Some(Self::Off),
            "write_only" | "write-only" => Some(Self::WriteOnly),
            "read_through" | "read-through" => Some(Self::ReadThrough),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Off)
    }

    pub fn serves_reads(&self) -> bool {
        matches!(self, Self::ReadThrough)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redb database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

pub type CacheResult<T> = Result<T, CacheError>;

pub struct ResponseCache {
    db: Arc<Database>,
}

impl ResponseCache {
    /// Open (or create) the store at the given path, creating its table.
    ///
    /// Reuses the handle of a store already open on the same path.
    pub fn open(path: &Path) -> CacheResult<Self> {
        let path = canonical_store_path(path)?;

        let mut open = OPEN_STORES
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(db) = open.get(&path).and_then(Weak::upgrade) {
            debug!(path = %path.display(), "Response cache shared");
            return Ok(Self { db });
        }

        let db = Database::create(&path)?;

        // Pre-create the table so read transactions on a fresh store don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(RESPONSES)?;
        }
        write_txn.commit()?;

        let db = Arc::new(db);
        open.retain(|_, handle| handle.strong_count() > 0);
        open.insert(path.clone(), Arc::downgrade(&db));

        debug!(path = %path.display(), "Response cache opened");
        Ok(Self { db })
    }

    /// Record the raw body returned for `uri` when `token` was presented.
    ///
    /// Rows for `uri` under any other token are removed in the same
    /// transaction.
    pub fn store(&self, uri: &str, token: &str, body: &str) -> CacheResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(RESPONSES)?;

            let mut superseded = Vec::new();
            for entry in table.range((uri, "")..)? {
                let (key, _) = entry?;
                let (row_uri, row_token) = key.value();
                if row_uri != uri {
                    break;
                }
                if row_token != token {
                    superseded.push(row_token.to_string());
                }
            }
            for old in &superseded {
                table.remove((uri, old.as_str()))?;
            }
            if !superseded.is_empty() {
                debug!(uri, removed = superseded.len(), "Superseded cache rows removed");
            }

            table.insert((uri, token), body)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn lookup(&self, uri: &str, token: &str) -> CacheResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RESPONSES)?;
        let body = table.get((uri, token))?.map(|guard| guard.value().to_string());
        Ok(body)
    }
}

/// Create the parent directory and resolve it, so aliases of one file share a handle.
fn canonical_store_path(path: &Path) -> CacheResult<PathBuf> {
    let Some(file_name) = path.file_name() else {
        return Ok(path.to_path_buf());
    };
    match path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            Ok(parent.canonicalize()?.join(file_name))
        }
        None => Ok(std::env::current_dir()?.join(file_name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use redb::ReadableTableMetadata;

    fn temp_cache() -> (ResponseCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(&dir.path().join(CACHE_FILE)).unwrap();
        (cache, dir)
    }

    fn row_count(cache: &ResponseCache) -> u64 {
        let read_txn = cache.db.begin_read().unwrap();
        let table = read_txn.open_table(RESPONSES).unwrap();
        table.len().unwrap()
    }

    #[test]
    fn test_fresh_store_is_empty() {
        let (cache, _dir) = temp_cache();
        assert_eq!(row_count(&cache), 0);
        assert_eq!(cache.lookup("https://zepher.test/env", "T").unwrap(), None);
    }

    #[test]
    fn test_store_and_lookup_by_uri_and_token() {
        let (cache, _dir) = temp_cache();
        cache.store("https://zepher.test/env", "T1", r#"{"jwt":"T2"}"#).unwrap();

        assert_eq!(
            cache.lookup("https://zepher.test/env", "T1").unwrap().as_deref(),
            Some(r#"{"jwt":"T2"}"#)
        );
        assert_eq!(cache.lookup("https://zepher.test/env", "T2").unwrap(), None);
        assert_eq!(cache.lookup("https://zepher.test/other", "T1").unwrap(), None);
    }

    #[test]
    fn test_store_overwrites_same_key() {
        let (cache, _dir) = temp_cache();
        cache.store("u", "t", "first").unwrap();
        cache.store("u", "t", "second").unwrap();
        assert_eq!(row_count(&cache), 1);
        assert_eq!(cache.lookup("u", "t").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_rotating_tokens_keep_one_row_per_uri() {
        let (cache, _dir) = temp_cache();
        for i in 0..50 {
            let token = format!("T{}", i);
            cache.store("https://zepher.test/env", &token, "body").unwrap();
        }
        cache.store("https://zepher.test/env?page=2", "T49", "page").unwrap();

        assert_eq!(row_count(&cache), 2);
        assert_eq!(cache.lookup("https://zepher.test/env", "T0").unwrap(), None);
        assert_eq!(
            cache.lookup("https://zepher.test/env", "T49").unwrap().as_deref(),
            Some("body")
        );
        assert_eq!(
            cache.lookup("https://zepher.test/env?page=2", "T49").unwrap().as_deref(),
            Some("page")
        );
    }

    #[test]
    fn test_uri_prefix_rows_are_kept() {
        let (cache, _dir) = temp_cache();
        cache.store("https://zepher.test/env", "T1", "short").unwrap();
        cache.store("https://zepher.test/env/roles", "T1", "long").unwrap();
        cache.store("https://zepher.test/env", "T2", "short2").unwrap();

        assert_eq!(
            cache.lookup("https://zepher.test/env/roles", "T1").unwrap().as_deref(),
            Some("long")
        );
        assert_eq!(row_count(&cache), 2);
    }

    #[test]
    fn test_open_twice_shares_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CACHE_FILE);
        let first = ResponseCache::open(&path).unwrap();
        let second = ResponseCache::open(&dir.path().join(".").join(CACHE_FILE)).unwrap();

        first.store("u", "t", "body").unwrap();
        assert_eq!(second.lookup("u", "t").unwrap().as_deref(), Some("body"));
        assert!(Arc::ptr_eq(&first.db, &second.db));
    }

    #[test]
    fn test_open_reports_directory_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let result = ResponseCache::open(&blocker.join("nested").join(CACHE_FILE));
        assert!(matches!(result, Err(CacheError::Io(_))));
    }

    #[test]
    fn test_body_content_is_stored_verbatim() {
        let (cache, _dir) = temp_cache();
        let body = r#"{"msg":"'); DROP TABLE responses; --"}"#;
        cache.store("u", "t", body).unwrap();
        assert_eq!(cache.lookup("u", "t").unwrap().as_deref(), Some(body));
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CACHE_FILE);
        {
            let cache = ResponseCache::open(&path).unwrap();
            cache.store("u", "t", "body").unwrap();
        }
        let cache = ResponseCache::open(&path).unwrap();
        assert_eq!(cache.lookup("u", "t").unwrap().as_deref(), Some("body"));
    }

    #[test]
    fn test_cache_mode_parse() {
        assert_eq!(CacheMode::parse("off"), Some(CacheMode::Off));
        assert_eq!(CacheMode::parse("Write-Only"), Some(CacheMode::WriteOnly));
        assert_eq!(CacheMode::parse("read_through"), Some(CacheMode::ReadThrough));
        assert_eq!(CacheMode::parse("sometimes"), None);
        assert_eq!(CacheMode::default(), CacheMode::WriteOnly);
    }
}
