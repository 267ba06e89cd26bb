//! Cache storage trait and SQLite implementation.
//!
//! Storage holds JSON snapshots of successful fetches so that a fresh process
//! can serve the last known value (offline reads) while it revalidates.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::key::QueryKey;

/// A persisted snapshot of one cache entry.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
  /// Resource kind the payload was stored as
  pub kind: String,
  /// Serialized payload
  pub data: Value,
  /// When the payload was fetched
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Get the snapshot stored for a key.
  fn load(&self, key: &QueryKey) -> Result<Option<StoredSnapshot>>;

  /// Store (or replace) the snapshot for a key.
  fn store(&self, key: &QueryKey, kind: &str, data: &Value) -> Result<()>;

  /// Remove the snapshot for a key.
  fn remove(&self, key: &QueryKey) -> Result<()>;

  /// Remove every snapshot of a resource.
  fn remove_resource(&self, resource: &str) -> Result<()>;

  /// Remove everything.
  fn clear(&self) -> Result<()>;
}

/// Storage implementation that doesn't persist anything.
/// Used when persistence is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn load(&self, _key: &QueryKey) -> Result<Option<StoredSnapshot>> {
    Ok(None) // Always miss
  }

  fn store(&self, _key: &QueryKey, _kind: &str, _data: &Value) -> Result<()> {
    Ok(()) // Discard
  }

  fn remove(&self, _key: &QueryKey) -> Result<()> {
    Ok(())
  }

  fn remove_resource(&self, _resource: &str) -> Result<()> {
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based snapshot storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the snapshot database.
  ///
  /// Uses `path` when given, otherwise the default location under the user's
  /// data directory.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("wowstat").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  /// Store a snapshot with an explicit fetch time.
  pub fn store_at(
    &self,
    key: &QueryKey,
    kind: &str,
    data: &Value,
    cached_at: DateTime<Utc>,
  ) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let data = serde_json::to_vec(data).map_err(|e| eyre!("Failed to serialize snapshot: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO query_cache (query_hash, resource, resource_kind, description, data, cached_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          key.cache_hash(),
          key.resource(),
          kind,
          key.description(),
          data,
          cached_at.to_rfc3339()
        ],
      )
      .map_err(|e| eyre!("Failed to store snapshot for {}: {}", key, e))?;

    Ok(())
  }

  /// Number of stored snapshots.
  pub fn len(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM query_cache", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count snapshots: {}", e))?;
    Ok(count as usize)
  }
}

/// Schema for the snapshot table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS query_cache (
    query_hash TEXT PRIMARY KEY,
    resource TEXT NOT NULL,
    resource_kind TEXT NOT NULL,
    description TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_query_cache_resource ON query_cache(resource);
"#;

impl CacheStorage for SqliteStorage {
  fn load(&self, key: &QueryKey) -> Result<Option<StoredSnapshot>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT resource_kind, data, cached_at FROM query_cache WHERE query_hash = ?",
        params![key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load snapshot for {}: {}", key, e))?;

    match row {
      Some((kind, data, cached_at)) => {
        let data: Value = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize snapshot for {}: {}", key, e))?;
        Ok(Some(StoredSnapshot {
          kind,
          data,
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn store(&self, key: &QueryKey, kind: &str, data: &Value) -> Result<()> {
    self.store_at(key, kind, data, Utc::now())
  }

  fn remove(&self, key: &QueryKey) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM query_cache WHERE query_hash = ?",
        params![key.cache_hash()],
      )
      .map_err(|e| eyre!("Failed to remove snapshot for {}: {}", key, e))?;

    Ok(())
  }

  fn remove_resource(&self, resource: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM query_cache WHERE resource = ?",
        params![resource],
      )
      .map_err(|e| eyre!("Failed to remove snapshots for {}: {}", resource, e))?;

    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM query_cache", [])
      .map_err(|e| eyre!("Failed to clear snapshots: {}", e))?;

    Ok(())
  }
}

/// Parse a stored datetime.
///
/// Rows written by this module use RFC 3339; rows that fell back to the
/// column default use SQLite's "YYYY-MM-DD HH:MM:SS".
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn key(resource: &str, params: &[&str]) -> QueryKey {
    QueryKey::new(resource, params.iter().copied()).unwrap()
  }

  #[test]
  fn test_store_and_load() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let k = key("dungeonStats", &["season-tww-2", "us"]);

    storage
      .store(&k, "dungeon_stats", &json!({"runs": 12}))
      .unwrap();

    let snapshot = storage.load(&k).unwrap().unwrap();
    assert_eq!(snapshot.kind, "dungeon_stats");
    assert_eq!(snapshot.data, json!({"runs": 12}));
    assert!(Utc::now() - snapshot.cached_at < chrono::Duration::seconds(5));
  }

  #[test]
  fn test_store_replaces() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let k = key("account", &["me"]);

    storage.store(&k, "account", &json!({"v": 1})).unwrap();
    storage.store(&k, "account", &json!({"v": 2})).unwrap();

    assert_eq!(storage.len().unwrap(), 1);
    assert_eq!(storage.load(&k).unwrap().unwrap().data, json!({"v": 2}));
  }

  #[test]
  fn test_missing_key() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert!(storage.load(&key("account", &["me"])).unwrap().is_none());
  }

  #[test]
  fn test_store_at_keeps_timestamp() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let k = key("character", &["us", "illidan", "thrall"]);
    let then = Utc::now() - chrono::Duration::hours(3);

    storage.store_at(&k, "character", &json!({}), then).unwrap();

    let snapshot = storage.load(&k).unwrap().unwrap();
    assert_eq!(snapshot.cached_at.timestamp(), then.timestamp());
  }

  #[test]
  fn test_remove_and_remove_resource() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let a = key("character", &["us", "illidan", "thrall"]);
    let b = key("character", &["eu", "kazzak", "jaina"]);
    let c = key("dungeonStats", &["season-tww-2", "us"]);
    for k in [&a, &b, &c] {
      storage.store(k, "x", &json!(null)).unwrap();
    }

    storage.remove(&a).unwrap();
    assert!(storage.load(&a).unwrap().is_none());
    assert_eq!(storage.len().unwrap(), 2);

    storage.remove_resource("character").unwrap();
    assert!(storage.load(&b).unwrap().is_none());
    assert!(storage.load(&c).unwrap().is_some());

    storage.clear().unwrap();
    assert_eq!(storage.len().unwrap(), 0);
  }

  #[test]
  fn test_parse_sqlite_datetime() {
    let dt = parse_datetime("2025-03-04 05:06:07").unwrap();
    assert_eq!(dt.to_rfc3339(), "2025-03-04T05:06:07+00:00");
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    let k = key("account", &["me"]);
    storage.store(&k, "account", &json!({})).unwrap();
    assert!(storage.load(&k).unwrap().is_none());
  }
}
