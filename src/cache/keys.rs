//! Cache key layout
//!
//! Regional keys are `"<region>:<category>"`. Global data uses bare names
//! (`s3`) or a `"<category>:<kind>"` pair (`iam:roles`). Keys ending in
//! `-enriched` or `:enriched` hold derived, cross-referenced collections.

use std::fmt;
use std::str::FromStr;

pub const S3_BUCKETS: &str = "s3";
pub const S3_ENRICHED: &str = "s3:enriched";
pub const IAM_ROLES: &str = "iam:roles";
pub const IAM_GROUPS: &str = "iam:groups";
pub const IAM_ENRICHED: &str = "iam:enriched";
pub const LAST_SYNC: &str = "last_sync";

/// `"us-east-1:subnets"`
pub fn regional(region: &str, category: &str) -> String {
    format!("{}:{}", region, category)
}

/// Whether a key holds a derived (enriched) collection
pub fn is_derived_key(key: &str) -> bool {
    key.ends_with("-enriched") || key.ends_with(":enriched")
}

/// Presentation tabs whose freshness is reported together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Net,
    Compute,
    Database,
    S3,
    Streaming,
    Ai,
    Iam,
}

impl Tab {
    pub const ALL: [Tab; 7] = [
        Tab::Net,
        Tab::Compute,
        Tab::Database,
        Tab::S3,
        Tab::Streaming,
        Tab::Ai,
        Tab::Iam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Net => "net",
            Tab::Compute => "compute",
            Tab::Database => "database",
            Tab::S3 => "s3",
            Tab::Streaming => "streaming",
            Tab::Ai => "ai",
            Tab::Iam => "iam",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tab::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown tab '{}' (expected one of net, compute, database, s3, streaming, ai, iam)", s))
    }
}

/// Keys whose newest write is shown as the tab's "last synced" time
pub fn tab_cache_keys(tab: Tab, region: &str) -> Vec<String> {
    let r = |category: &str| regional(region, category);
    match tab {
        Tab::Net => vec![r("vpcs"), r("subnets"), r("security-groups"), r("network-enriched")],
        Tab::Compute => vec![r("ec2"), r("ec2-enriched"), r("ecs-enriched"), r("lambda"), r("lambda-enriched")],
        Tab::Database => vec![r("rds"), r("dynamodb-enriched"), r("elasticache-enriched")],
        Tab::S3 => vec![
            S3_BUCKETS.to_string(),
            S3_ENRICHED.to_string(),
            r("redshift"),
            r("athena"),
            r("athena-enriched"),
            r("glue"),
            r("glue-enriched"),
        ],
        Tab::Streaming => vec![r("streaming-enriched")],
        Tab::Ai => vec![r("ai-enriched")],
        Tab::Iam => vec![IAM_ENRICHED.to_string(), IAM_ROLES.to_string()],
    }
}
