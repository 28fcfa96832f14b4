//! Region catalogue and discovery

use super::cli::{CliError, CommandRunner};
use serde_json::Value;

/// Region code -> human name
const REGION_NAMES: &[(&str, &str)] = &[
    ("us-east-1", "N. Virginia"),
    ("us-east-2", "Ohio"),
    ("us-west-1", "N. California"),
    ("us-west-2", "Oregon"),
    ("af-south-1", "Cape Town"),
    ("ap-east-1", "Hong Kong"),
    ("ap-south-1", "Mumbai"),
    ("ap-south-2", "Hyderabad"),
    ("ap-southeast-1", "Singapore"),
    ("ap-southeast-2", "Sydney"),
    ("ap-southeast-3", "Jakarta"),
    ("ap-southeast-4", "Melbourne"),
    ("ap-southeast-5", "Malaysia"),
    ("ap-northeast-1", "Tokyo"),
    ("ap-northeast-2", "Seoul"),
    ("ap-northeast-3", "Osaka"),
    ("ca-central-1", "Canada"),
    ("ca-west-1", "Calgary"),
    ("eu-central-1", "Frankfurt"),
    ("eu-central-2", "Zurich"),
    ("eu-west-1", "Ireland"),
    ("eu-west-2", "London"),
    ("eu-west-3", "Paris"),
    ("eu-south-1", "Milan"),
    ("eu-south-2", "Spain"),
    ("eu-north-1", "Stockholm"),
    ("il-central-1", "Tel Aviv"),
    ("me-south-1", "Bahrain"),
    ("me-central-1", "UAE"),
    ("sa-east-1", "Sao Paulo"),
    ("mx-central-1", "Mexico City"),
];

/// Friendly name for a region code, if known
pub fn region_name(code: &str) -> Option<&'static str> {
    REGION_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// "us-east-1 (N. Virginia)", or the bare code for unknown regions
pub fn display_name(code: &str) -> String {
    match region_name(code) {
        Some(name) => format!("{} ({})", code, name),
        None => code.to_string(),
    }
}

/// Ask the CLI which regions the account can use (opted-in or opt-in-not-required)
pub async fn discover_regions<R: CommandRunner + ?Sized>(runner: &R) -> Result<Vec<String>, CliError> {
    let data = runner
        .run(&[
            "ec2",
            "describe-regions",
            "--all-regions",
            "--query",
            "Regions[?OptInStatus!='not-opted-in'].[RegionName]",
        ])
        .await?;

    Ok(parse_region_names(&data))
}

/// The query above yields `[["us-east-1"], ["eu-west-1"], ...]`; a plain
/// `describe-regions` response is accepted too.
fn parse_region_names(data: &Value) -> Vec<String> {
    if let Some(rows) = data.as_array() {
        return rows
            .iter()
            .filter_map(|row| match row {
                Value::Array(cells) => cells.first().and_then(Value::as_str),
                Value::String(s) => Some(s.as_str()),
                _ => None,
            })
            .map(str::to_string)
            .collect();
    }

    data.get("Regions")
        .and_then(Value::as_array)
        .map(|regions| {
            regions
                .iter()
                .filter_map(|r| r.get("RegionName").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
