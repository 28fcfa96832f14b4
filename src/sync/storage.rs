//! S3 buckets. The bucket list is global; each bucket is then inspected for its
//! region, public-access configuration, and versioning.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{format_time_text, parse_list, read_derived, step, OnStep, SyncResult, Syncer};
use crate::cache::{keys, CacheStore};

/// Region reported for buckets with no location constraint
const DEFAULT_BUCKET_REGION: &str = "us-east-1";

const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";
const AUTHENTICATED_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketAccess {
    Private,
    Public,
    #[default]
    Unknown,
}

impl BucketAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PublicAccessBlock {
    pub block_public_acls: bool,
    pub ignore_public_acls: bool,
    pub block_public_policy: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlock {
    pub fn is_complete(&self) -> bool {
        self.block_public_acls && self.ignore_public_acls && self.block_public_policy && self.restrict_public_buckets
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Bucket {
    pub name: String,
    pub creation_date: String,
    pub region: String,
    pub access: BucketAccess,
    pub versioning: String,
    pub public_access_block: Option<PublicAccessBlock>,
    pub policy_public: bool,
    #[serde(rename = "ACLPublic")]
    pub acl_public: bool,
}

impl Default for Bucket {
    fn default() -> Self {
        Self {
            name: String::new(),
            creation_date: String::new(),
            region: String::new(),
            access: BucketAccess::Unknown,
            versioning: "Unknown".to_string(),
            public_access_block: None,
            policy_public: false,
            acl_public: false,
        }
    }
}

/// Account-wide bucket view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageData {
    pub buckets: Vec<Bucket>,
}

/// Overall exposure of a bucket.
///
/// A complete public-access block wins; otherwise a public policy or ACL
/// makes the bucket public; a partial block still counts as private.
pub fn determine_access(bucket: &Bucket) -> BucketAccess {
    match bucket.public_access_block {
        Some(block) if block.is_complete() => BucketAccess::Private,
        _ if bucket.policy_public || bucket.acl_public => BucketAccess::Public,
        Some(_) => BucketAccess::Private,
        None => BucketAccess::Unknown,
    }
}

// --- wire shapes ----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BucketRecord {
    name: String,
    creation_date: String,
}

impl From<BucketRecord> for Bucket {
    fn from(r: BucketRecord) -> Self {
        Self {
            name: r.name,
            creation_date: format_time_text(&r.creation_date),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Grantee {
    #[serde(rename = "URI")]
    uri: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Grant {
    grantee: Grantee,
}

fn parse_buckets(data: &Value) -> Vec<Bucket> {
    parse_list::<BucketRecord>(data, "Buckets")
        .into_iter()
        .map(Bucket::from)
        .collect()
}

fn bucket_region(location: &Value) -> String {
    location
        .get("LocationConstraint")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_BUCKET_REGION)
        .to_string()
}

fn acl_is_public(acl: &Value) -> bool {
    parse_list::<Grant>(acl, "Grants")
        .iter()
        .any(|g| g.grantee.uri == ALL_USERS_URI || g.grantee.uri == AUTHENTICATED_USERS_URI)
}

fn versioning_status(data: &Value) -> String {
    data.get("Status")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("Disabled")
        .to_string()
}

impl Syncer {
    pub async fn sync_storage(&self, on_step: OnStep<'_>) -> Result<Vec<SyncResult>> {
        let mut results = Vec::with_capacity(1);

        let (result, data) = self
            .sync_raw("s3", keys::S3_BUCKETS, &["s3api", "list-buckets"], "Buckets")
            .await;
        results.push(result);
        step(on_step, "s3");

        if let Some(data) = data {
            let buckets = self
                .enrich(parse_buckets(&data), |bucket| self.inspect_bucket(bucket))
                .await;
            self.store_derived(keys::S3_ENRICHED, &StorageData { buckets }, &mut results);
            step(on_step, "bucket details");
        }

        Ok(results)
    }

    /// Each check is independent; a denied call leaves its field at the default
    async fn inspect_bucket(&self, mut bucket: Bucket) -> Bucket {
        let name = bucket.name.clone();

        if let Some(data) = self.lookup(&["s3api", "get-bucket-location", "--bucket", &name]).await {
            bucket.region = bucket_region(&data);
        }

        if let Some(data) = self.lookup(&["s3api", "get-public-access-block", "--bucket", &name]).await {
            bucket.public_access_block = Some(
                data.get("PublicAccessBlockConfiguration")
                    .and_then(|v| PublicAccessBlock::deserialize(v).ok())
                    .unwrap_or_default(),
            );
        }

        if let Some(data) = self.lookup(&["s3api", "get-bucket-policy-status", "--bucket", &name]).await {
            bucket.policy_public = data
                .pointer("/PolicyStatus/IsPublic")
                .and_then(Value::as_bool)
                .unwrap_or(false);
        }

        if let Some(data) = self.lookup(&["s3api", "get-bucket-acl", "--bucket", &name]).await {
            bucket.acl_public = acl_is_public(&data);
        }

        if let Some(data) = self.lookup(&["s3api", "get-bucket-versioning", "--bucket", &name]).await {
            bucket.versioning = versioning_status(&data);
        }

        bucket.access = determine_access(&bucket);
        bucket
    }
}

/// Bucket view. Falls back to the bare bucket list, with access and
/// versioning unknown, when no enriched collection is cached.
pub fn load_storage(store: &CacheStore) -> Result<StorageData> {
    if let Some(data) = read_derived::<StorageData>(store, keys::S3_ENRICHED)? {
        if !data.buckets.is_empty() {
            return Ok(data);
        }
    }

    let buckets = store
        .read(keys::S3_BUCKETS)?
        .map(|data| parse_buckets(&data))
        .unwrap_or_default();
    Ok(StorageData { buckets })
}
