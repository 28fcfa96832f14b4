//! Configuration Management
//!
//! Handles persistent configuration storage for cloudsnap.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Region used when nothing else is configured
pub const FALLBACK_REGION: &str = "us-east-1";

/// Default width of the per-item enrichment fan-out
pub const DEFAULT_ENRICH_CONCURRENCY: usize = 4;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Last used region
    #[serde(default)]
    pub region: Option<String>,
    /// Name or path of the aws CLI binary
    #[serde(default)]
    pub aws_binary: Option<String>,
    /// Deadline for a single CLI call, in seconds
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
    /// How many dependent lookups may run at once during enrichment
    #[serde(default)]
    pub enrich_concurrency: Option<usize>,
    /// Override for the cache database location
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudsnap").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective region (config > AWS_REGION > AWS_DEFAULT_REGION > aws CLI default)
    pub fn effective_region(&self, detected: Option<&str>) -> String {
        self.region
            .clone()
            .filter(|r| !r.is_empty())
            .or_else(|| env_non_empty("AWS_REGION"))
            .or_else(|| env_non_empty("AWS_DEFAULT_REGION"))
            .or_else(|| detected.filter(|r| !r.is_empty()).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_REGION.to_string())
    }

    pub fn effective_binary(&self) -> String {
        self.aws_binary
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "aws".to_string())
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(crate::aws::cli::DEFAULT_CALL_TIMEOUT)
    }

    pub fn enrich_concurrency(&self) -> usize {
        self.enrich_concurrency
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_ENRICH_CONCURRENCY)
    }

    /// Cache database location (config override > data dir)
    pub fn db_path(&self) -> Option<PathBuf> {
        self.db_path.clone().or_else(|| {
            dirs::data_dir()
                .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
                .map(|p| p.join("cloudsnap").join("cache.db"))
        })
    }

    /// Set region and save
    pub fn set_region(&mut self, region: &str) -> Result<()> {
        self.region = Some(region.to_string());
        self.save()
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.effective_binary(), "aws");
        assert_eq!(config.call_timeout(), Duration::from_secs(60));
        assert_eq!(config.enrich_concurrency(), DEFAULT_ENRICH_CONCURRENCY);
    }

    #[test]
    fn test_configured_region_wins() {
        let config = Config {
            region: Some("eu-west-1".to_string()),
            ..Default::default()
        };
        assert_eq!(config.effective_region(Some("us-west-2")), "eu-west-1");
    }

    #[test]
    fn test_zero_values_fall_back() {
        let config = Config {
            call_timeout_secs: Some(0),
            enrich_concurrency: Some(0),
            aws_binary: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(config.call_timeout(), Duration::from_secs(60));
        assert_eq!(config.enrich_concurrency(), DEFAULT_ENRICH_CONCURRENCY);
        assert_eq!(config.effective_binary(), "aws");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"region": "ap-south-1"}"#).unwrap();
        assert_eq!(config.region.as_deref(), Some("ap-south-1"));
        assert!(config.aws_binary.is_none());
        assert!(config.db_path.is_none());
    }
}
