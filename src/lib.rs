//! cloudsnap: a local, queryable snapshot of an AWS account.
//!
//! The aws CLI is the only way in. Its JSON is normalized into typed
//! records, cross-referenced, and kept in a SQLite cache so the views keep
//! working offline.

pub mod aws;
pub mod cache;
pub mod config;
pub mod policy;
pub mod sync;
