//! Cache Store
//!
//! A single SQLite file holding three tables:
//! - `cache`: key -> JSON blob, with the time of the last write
//! - `regions`: which regions the user wants synced
//! - `settings`: small string values (reserved)
//!
//! Every sync result lands here, and everything presented to the user is
//! read back from here.

pub mod keys;
mod storage;

pub use keys::{is_derived_key, regional, tab_cache_keys, Tab};
pub use storage::{CacheEntry, CacheStore, LastSync, RegionFlag};

use std::path::PathBuf;
use thiserror::Error;

/// Cache store failures
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cache value for {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to create cache directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid timestamp {value:?} stored for {key}")]
    Timestamp { key: String, value: String },

    #[error("cache connection lock poisoned")]
    Poisoned,
}
