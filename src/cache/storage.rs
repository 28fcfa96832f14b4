//! SQLite implementation of the cache store.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::keys::LAST_SYNC;
use super::CacheError;

type Result<T> = std::result::Result<T, CacheError>;

/// How long a writer waits on another process's lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    synced_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS regions (
    name TEXT PRIMARY KEY,
    enabled INTEGER NOT NULL DEFAULT 1
);
"#;

/// One cached blob and when it was written
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub synced_at: DateTime<Utc>,
}

/// A row of the region table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionFlag {
    pub name: String,
    pub enabled: bool,
}

/// Record of the last whole-account sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSync {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub services: BTreeMap<String, bool>,
}

/// SQLite-backed cache.
///
/// All access goes through one connection behind a mutex, so writes from
/// this process are serialized; other processes are held off by SQLite's
/// own locking and the busy timeout.
pub struct CacheStore {
    conn: Mutex<Connection>,
}

impl CacheStore {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// A private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(CACHE_SCHEMA)?;
        tracing::debug!("Cache schema ready");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    // --- cache entries -------------------------------------------------------

    /// Upsert `value` under `key`, stamping it with the current time
    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let data = serde_json::to_string(value).map_err(|source| CacheError::Serialization {
            key: key.to_string(),
            source,
        })?;
        let now = format_timestamp(Utc::now());

        self.conn()?.execute(
            "INSERT INTO cache (key, value, synced_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, synced_at = excluded.synced_at",
            params![key, data, now],
        )?;

        tracing::debug!("Cached {} ({} bytes)", key, data.len());
        Ok(())
    }

    /// The blob under `key`; `Ok(None)` when nothing was ever written there
    pub fn read(&self, key: &str) -> Result<Option<Value>> {
        self.read_as::<Value>(key)
    }

    /// Read and deserialize into `T`
    pub fn read_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let data: Option<String> = self
            .conn()?
            .query_row("SELECT value FROM cache WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;

        data.map(|d| decode(key, &d)).transpose()
    }

    /// Blob plus timestamp
    pub fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row: Option<(String, String)> = self
            .conn()?
            .query_row(
                "SELECT value, synced_at FROM cache WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((data, synced_at)) = row else {
            return Ok(None);
        };

        Ok(Some(CacheEntry {
            key: key.to_string(),
            value: decode(key, &data)?,
            synced_at: parse_timestamp(key, &synced_at)?,
        }))
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row("SELECT 1 FROM cache WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// When `key` was last written
    pub fn synced_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let stamp: Option<String> = self
            .conn()?
            .query_row("SELECT synced_at FROM cache WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;

        stamp.map(|s| parse_timestamp(key, &s)).transpose()
    }

    /// Newest write time among `keys`; `None` if none of them exist
    pub fn most_recent_sync_time<S: AsRef<str>>(&self, keys: &[S]) -> Result<Option<DateTime<Utc>>> {
        let mut newest = None;
        for key in keys {
            if let Some(ts) = self.synced_at(key.as_ref())? {
                newest = newest.max(Some(ts));
            }
        }
        Ok(newest)
    }

    /// Every cached key, sorted
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM cache ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    // --- regions ---------------------------------------------------------------

    /// Insert regions that are not yet known, enabled. Existing flags are kept.
    pub fn seed_regions<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO regions (name, enabled) VALUES (?1, 1)")?;
            for name in names {
                stmt.execute(params![name.as_ref()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_regions(&self) -> Result<Vec<RegionFlag>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, enabled FROM regions ORDER BY name")?;
        let regions = stmt
            .query_map([], |row| {
                Ok(RegionFlag {
                    name: row.get(0)?,
                    enabled: row.get::<_, i64>(1)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(regions)
    }

    pub fn list_enabled_regions(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM regions WHERE enabled = 1 ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Returns false when the region is unknown (nothing changes)
    pub fn set_region_enabled(&self, name: &str, enabled: bool) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE regions SET enabled = ?1 WHERE name = ?2",
            params![enabled as i64, name],
        )?;
        Ok(changed > 0)
    }

    // --- settings ----------------------------------------------------------------

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()?
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // --- last sync -----------------------------------------------------------------

    /// Record a whole-account sync covering `services`
    pub fn write_last_sync<S: AsRef<str>>(&self, services: &[S]) -> Result<()> {
        let record = LastSync {
            timestamp: Utc::now(),
            services: services.iter().map(|s| (s.as_ref().to_string(), true)).collect(),
        };
        self.write(LAST_SYNC, &record)
    }

    pub fn read_last_sync(&self) -> Result<Option<LastSync>> {
        self.read_as(LAST_SYNC)
    }
}

fn decode<T: DeserializeOwned>(key: &str, data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|source| CacheError::Serialization {
        key: key.to_string(),
        source,
    })
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(key: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| CacheError::Timestamp {
            key: key.to_string(),
            value: value.to_string(),
        })
}
