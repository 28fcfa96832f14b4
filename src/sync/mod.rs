//! Sync Orchestrators
//!
//! One orchestrator per resource category. Each issues its CLI calls in a
//! fixed order, writes the raw documents and an enriched collection into the
//! cache, and reports one [`SyncResult`] per sub-resource. A failing
//! sub-resource never stops its siblings.
//!
//! The `load_*` functions are the read side: they deserialize what a sync
//! left behind, preferring the enriched key and rebuilding from raw keys
//! when it is missing.

pub mod ai;
pub mod compute;
pub mod database;
pub mod identity;
pub mod network;
pub mod progress;
pub mod storage;
pub mod streaming;
pub mod warehouse;

pub use ai::{load_ai, AiData};
pub use compute::{load_compute, ComputeData};
pub use database::{load_database, DatabaseData};
pub use identity::{load_identity, IdentityData};
pub use network::{classify_routes, load_network, NetworkData, RouteAccess};
pub use progress::{SyncHandle, SyncJob, SyncStatus, SyncTracker};
pub use storage::{determine_access, load_storage, BucketAccess, StorageData};
pub use streaming::{load_streaming, StreamingData};
pub use warehouse::{load_warehouse, WarehouseData};

use anyhow::{Context, Result};
use chrono::DateTime;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use crate::aws::regions::discover_regions;
use crate::aws::CommandRunner;
use crate::cache::{regional, CacheError, CacheStore, RegionFlag};
use crate::config::DEFAULT_ENRICH_CONCURRENCY;

/// Display format for timestamps in enriched records
const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Outcome of one sub-resource within a sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub service: String,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn ok(service: &str, count: usize) -> Self {
        Self {
            service: service.to_string(),
            count,
            error: None,
        }
    }

    pub fn failed(service: &str, error: impl fmt::Display) -> Self {
        Self {
            service: service.to_string(),
            count: 0,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Progress callback, invoked with a label after each phase
pub type OnStep<'a> = Option<&'a (dyn Fn(&str) + Sync)>;

fn step(on_step: OnStep<'_>, label: &str) {
    tracing::debug!("Sync step: {}", label);
    if let Some(f) = on_step {
        f(label);
    }
}

/// Resource categories, in the order a full sync visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Network,
    Storage,
    Warehouse,
    Database,
    Compute,
    Streaming,
    Ai,
    Identity,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Network,
        Category::Storage,
        Category::Warehouse,
        Category::Database,
        Category::Compute,
        Category::Streaming,
        Category::Ai,
        Category::Identity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Warehouse => "warehouse",
            Self::Database => "database",
            Self::Compute => "compute",
            Self::Streaming => "streaming",
            Self::Ai => "ai",
            Self::Identity => "identity",
        }
    }

    /// Section heading for progress output
    pub fn title(&self) -> &'static str {
        match self {
            Self::Network => "Network",
            Self::Storage => "S3",
            Self::Warehouse => "Data Warehouse",
            Self::Database => "Database",
            Self::Compute => "Compute",
            Self::Streaming => "Queues & Streaming",
            Self::Ai => "AI & ML",
            Self::Identity => "IAM",
        }
    }

    /// Whether the category ignores the region argument
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Storage | Self::Identity)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "network" | "net" | "vpc" => Ok(Self::Network),
            "storage" | "s3" => Ok(Self::Storage),
            "warehouse" | "data" => Ok(Self::Warehouse),
            "database" | "db" => Ok(Self::Database),
            "compute" => Ok(Self::Compute),
            "streaming" => Ok(Self::Streaming),
            "ai" | "ml" => Ok(Self::Ai),
            "identity" | "iam" => Ok(Self::Identity),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

/// Drives the orchestrators against one runner and one cache
pub struct Syncer {
    runner: Arc<dyn CommandRunner>,
    store: Arc<CacheStore>,
    concurrency: usize,
}

impl Syncer {
    pub fn new(runner: Arc<dyn CommandRunner>, store: Arc<CacheStore>) -> Self {
        Self {
            runner,
            store,
            concurrency: DEFAULT_ENRICH_CONCURRENCY,
        }
    }

    /// Width of the per-item enrichment fan-out (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Sync one category
    pub async fn sync_category(&self, category: Category, region: &str, on_step: OnStep<'_>) -> Result<Vec<SyncResult>> {
        tracing::info!("Syncing {} ({})", category, if category.is_global() { "global" } else { region });
        let results = match category {
            Category::Network => self.sync_network(region, on_step).await,
            Category::Storage => self.sync_storage(on_step).await,
            Category::Warehouse => self.sync_warehouse(region, on_step).await,
            Category::Database => self.sync_database(region, on_step).await,
            Category::Compute => self.sync_compute(region, on_step).await,
            Category::Streaming => self.sync_streaming(region, on_step).await,
            Category::Ai => self.sync_ai(region, on_step).await,
            Category::Identity => self.sync_identity(on_step).await,
        }
        .with_context(|| format!("{} sync failed", category))?;

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        tracing::info!("{} sync done: {} sub-resources, {} failed", category, results.len(), failed);
        Ok(results)
    }

    /// Sync every category and record which services succeeded
    pub async fn sync_all(&self, region: &str, on_step: OnStep<'_>) -> Result<Vec<SyncResult>> {
        let mut results = Vec::new();
        for category in Category::ALL {
            results.extend(self.sync_category(category, region, on_step).await?);
        }

        self.record_last_sync(&results)?;
        Ok(results)
    }

    /// Store which services in `results` succeeded, stamped now
    pub fn record_last_sync(&self, results: &[SyncResult]) -> Result<()> {
        let synced: Vec<&str> = results
            .iter()
            .filter(|r| r.is_ok())
            .map(|r| r.service.as_str())
            .collect();
        self.store
            .write_last_sync(&synced)
            .context("Failed to record last sync")
    }

    /// Populate the region table from a live lookup the first time it is needed
    pub async fn ensure_regions_seeded(&self) -> Result<Vec<RegionFlag>> {
        let existing = self.store.list_regions()?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let names = discover_regions(&*self.runner)
            .await
            .context("Failed to discover regions")?;
        tracing::info!("Seeding {} regions", names.len());
        self.store.seed_regions(&names)?;

        Ok(self.store.list_regions()?)
    }

    // --- shared plumbing -----------------------------------------------------------

    /// Run a listing call, cache the raw document under `key`, and count the
    /// entries under `field`. The document is handed back for enrichment
    /// even when the cache write failed.
    async fn sync_raw(&self, service: &str, key: &str, args: &[&str], field: &str) -> (SyncResult, Option<Value>) {
        match self.runner.run(args).await {
            Ok(data) => {
                let count = count_items(&data, field);
                let result = match self.store.write(key, &data) {
                    Ok(()) => SyncResult::ok(service, count),
                    Err(e) => {
                        tracing::warn!("Failed to cache {}: {}", key, e);
                        SyncResult::failed(service, format!("cache write {}: {}", key, e))
                    },
                };
                (result, Some(data))
            },
            Err(e) => {
                tracing::warn!("{} sync failed: {}", service, e);
                (SyncResult::failed(service, &e), None)
            },
        }
    }

    /// A dependent lookup whose failure just leaves a field empty
    async fn lookup(&self, args: &[&str]) -> Option<Value> {
        match self.runner.run(args).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("Lookup skipped: {}", e);
                None
            },
        }
    }

    /// Security groups are cached with compute, database and warehouse so
    /// references resolve from those views. Failures are not reported.
    async fn precache_security_groups(&self, region: &str) {
        let key = regional(region, "security-groups");
        if let Some(data) = self
            .lookup(&["ec2", "describe-security-groups", "--region", region])
            .await
        {
            if let Err(e) = self.store.write(&key, &data) {
                tracing::warn!("Failed to cache {}: {}", key, e);
            }
        }
    }

    /// Write a derived collection. A failure is reported on the last result
    /// that would otherwise look successful.
    fn store_derived<T: Serialize + ?Sized>(&self, key: &str, value: &T, results: &mut [SyncResult]) {
        if let Err(e) = self.store.write(key, value) {
            tracing::warn!("Failed to cache {}: {}", key, e);
            if let Some(last) = results.iter_mut().rev().find(|r| r.is_ok()) {
                last.error = Some(format!("cache write {}: {}", key, e));
            }
        }
    }

    /// Run `f` over `items` with bounded concurrency, keeping input order
    async fn enrich<T, O, F, Fut>(&self, items: Vec<T>, f: F) -> Vec<O>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = O>,
    {
        stream::iter(items).map(f).buffered(self.concurrency).collect().await
    }

    /// Attached then inline (suffixed) policy names of a role
    async fn role_policies(&self, role_name: &str) -> Vec<String> {
        let mut policies = Vec::new();

        if let Some(data) = self
            .lookup(&["iam", "list-attached-role-policies", "--role-name", role_name])
            .await
        {
            policies.extend(attached_policy_names(&data));
        }

        if let Some(data) = self
            .lookup(&["iam", "list-role-policies", "--role-name", role_name])
            .await
        {
            policies.extend(
                string_list(&data, "PolicyNames")
                    .into_iter()
                    .map(|name| format!("{} (inline)", name)),
            );
        }

        policies
    }

    /// Role name and policies for a role ARN
    async fn resolve_role(&self, role_arn: &str) -> (String, Vec<String>) {
        let role_name = name_from_arn(role_arn);
        if role_name.is_empty() {
            return (String::new(), Vec::new());
        }
        let policies = self.role_policies(&role_name).await;
        (role_name, policies)
    }
}

/// A derived collection for a loader. One that no longer decodes (written by
/// an older build, say) counts as absent so the caller rebuilds from raw keys.
fn read_derived<T: DeserializeOwned>(store: &CacheStore, key: &str) -> Result<Option<T>> {
    match store.read_as::<T>(key) {
        Ok(data) => Ok(data),
        Err(CacheError::Serialization { source, .. }) => {
            tracing::warn!("Ignoring unreadable {}: {}", key, source);
            Ok(None)
        },
        Err(e) => Err(e.into()),
    }
}

// --- parsing helpers ---------------------------------------------------------------

/// Entries of `data[field]`, or nothing
fn items<'a>(data: &'a Value, field: &str) -> &'a [Value] {
    data.get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn count_items(data: &Value, field: &str) -> usize {
    items(data, field).len()
}

/// Deserialize one record. When some field has the wrong shape, the record
/// is logged and rebuilt without the fields that do not fit, so they take
/// their zero value and the rest (ids included) survive.
fn parse_lenient<T: DeserializeOwned + Default>(value: &Value, what: &str) -> T {
    match T::deserialize(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Malformed {} record: {}", what, e);
            salvage(value, what)
        },
    }
}

/// Add the fields of `value` one at a time, leaving out nulls and any field
/// whose addition makes the record fail to deserialize
fn salvage<T: DeserializeOwned + Default>(value: &Value, what: &str) -> T {
    let Value::Object(fields) = value else {
        return T::default();
    };

    let mut kept = Map::new();
    for (name, field) in fields {
        if field.is_null() {
            continue;
        }
        kept.insert(name.clone(), field.clone());
        if T::deserialize(Value::Object(kept.clone())).is_err() {
            tracing::debug!("Dropping field {} of {} record", name, what);
            kept.remove(name);
        }
    }

    T::deserialize(Value::Object(kept)).unwrap_or_default()
}

/// `parse_lenient` over every entry of `data[field]`
fn parse_list<T: DeserializeOwned + Default>(data: &Value, field: &str) -> Vec<T> {
    items(data, field)
        .iter()
        .map(|item| parse_lenient(item, field))
        .collect()
}

/// Strings under `data[field]`
fn string_list(data: &Value, field: &str) -> Vec<String> {
    items(data, field)
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn attached_policy_names(data: &Value) -> Vec<String> {
    items(data, "AttachedPolicies")
        .iter()
        .filter_map(|p| p.get("PolicyName").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Trailing `/` segment of an ARN: `arn:aws:iam::1:role/svc/MyRole` -> `MyRole`
pub fn name_from_arn(arn: &str) -> String {
    arn.rsplit('/').next().unwrap_or(arn).to_string()
}

/// AWS `Key`/`Value` tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Tag {
    key: String,
    value: String,
}

fn tag_name(tags: &[Tag]) -> String {
    tags.iter()
        .find(|t| t.key == "Name")
        .map(|t| t.value.clone())
        .unwrap_or_default()
}

/// Render a timestamp as `YYYY-MM-DD HH:MM`. RFC 3339 strings keep their
/// own offset; epoch seconds (number or numeric string) are shown in UTC.
/// Anything else comes back verbatim.
pub fn format_time(value: &Value) -> String {
    match value {
        Value::String(s) => format_time_str(s),
        Value::Number(n) => n
            .as_f64()
            .and_then(format_epoch)
            .unwrap_or_else(|| n.to_string()),
        _ => String::new(),
    }
}

fn format_time_str(s: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.format(DISPLAY_TIME_FORMAT).to_string();
    }
    if let Ok(secs) = s.parse::<f64>() {
        if let Some(formatted) = format_epoch(secs) {
            return formatted;
        }
    }
    s.to_string()
}

fn format_epoch(secs: f64) -> Option<String> {
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    DateTime::from_timestamp(secs as i64, 0).map(|dt| dt.format(DISPLAY_TIME_FORMAT).to_string())
}

/// Same as `format_time` for values already known to be strings
fn format_time_text(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    format_time_str(s)
}
