//! CLI detection
//!
//! Reports whether the aws CLI is installed and how it is configured. The
//! result is kept in a small temp file for a minute so repeated invocations
//! of the binary don't pay for four subprocesses each time.

use super::cli::{AwsCli, CommandRunner};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// How long a detection result stays valid
const DETECT_TTL: Duration = Duration::from_secs(60);

/// What we know about the local aws CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliStatus {
    pub installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

fn cache_file() -> PathBuf {
    std::env::temp_dir().join("cloudsnap-aws-detect.json")
}

/// Detect, reusing a recent result when one is on disk
pub async fn detect_cached(cli: &AwsCli) -> CliStatus {
    if let Some(status) = read_cached() {
        return status;
    }

    let status = detect(cli).await;

    match serde_json::to_vec(&status) {
        Ok(data) => {
            if let Err(e) = std::fs::write(cache_file(), data) {
                tracing::debug!("Could not write detection cache: {}", e);
            }
        },
        Err(e) => tracing::debug!("Could not serialize detection result: {}", e),
    }

    status
}

fn read_cached() -> Option<CliStatus> {
    let path = cache_file();
    let age = std::fs::metadata(&path).ok()?.modified().ok()?.elapsed().ok()?;
    if age >= DETECT_TTL {
        return None;
    }
    let data = std::fs::read(&path).ok()?;
    serde_json::from_slice::<CliStatus>(&data)
        .ok()
        .filter(|s| s.installed)
}

/// Ask the CLI directly
pub async fn detect(cli: &AwsCli) -> CliStatus {
    let mut status = CliStatus::default();

    // `aws --version` prints e.g. "aws-cli/2.15.0 Python/3.11.6 Linux/6.5 ..."
    let Some(version_out) = plain_output(cli.program(), &["--version"]).await else {
        return status;
    };
    status.installed = true;
    status.version = version_out
        .split_whitespace()
        .next()
        .map(str::to_string);

    status.region = plain_output(cli.program(), &["configure", "get", "region"])
        .await
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if let Some(listing) = plain_output(cli.program(), &["configure", "list"]).await {
        status.profile = parse_profile(&listing);
    }

    match cli.run(&["sts", "get-caller-identity"]).await {
        Ok(identity) => {
            status.account_id = identity
                .get("Account")
                .and_then(|v| v.as_str())
                .map(str::to_string);
        },
        Err(e) => tracing::debug!("Caller identity unavailable: {}", e),
    }

    status
}

/// Run a text-output subcommand; `None` when it can't be launched or fails
async fn plain_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    // Older v1 CLIs print the version banner on stderr
    let text = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    Some(String::from_utf8_lossy(&text).to_string())
}

/// Pick the profile name out of `aws configure list`:
///
/// ```text
///       Name                    Value             Type    Location
///       ----                    -----             ----    --------
///    profile                  default           manual    --profile
/// ```
fn parse_profile(listing: &str) -> Option<String> {
    listing
        .lines()
        .filter(|line| line.contains("profile"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [_, value, ..] if *value != "<not" => Some(value.to_string()),
                _ => None,
            }
        })
        .last()
}
