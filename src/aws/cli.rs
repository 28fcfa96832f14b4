//! Process Runner
//!
//! Spawns the `aws` CLI once per call, always asking for JSON output, and
//! classifies what went wrong when it does not hand back a document.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::config::Config;

/// Default per-call deadline
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum length of stderr to log
const MAX_LOG_STDERR_LENGTH: usize = 200;

/// Failure of a single CLI invocation.
///
/// Every variant renders as `aws <command>: <detail>` so it can be dropped
/// straight into a `SyncResult` error field.
#[derive(Error, Debug)]
pub enum CliError {
    /// The process could not be launched (missing binary, permissions, ...)
    #[error("aws {command}: {source}")]
    Invocation {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited nonzero
    #[error("aws {command}: {}", stderr.trim())]
    Tool { command: String, stderr: String },

    /// The tool did not finish before the deadline and was killed
    #[error("aws {command}: timed out after {}s", after.as_secs())]
    Timeout { command: String, after: Duration },

    /// Exit 0, but stdout was not a JSON document
    #[error("aws {command}: malformed output: {source}")]
    Malformed {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CliError {
    /// The `<service> <operation>` pair the error belongs to
    pub fn command(&self) -> &str {
        match self {
            Self::Invocation { command, .. }
            | Self::Tool { command, .. }
            | Self::Timeout { command, .. }
            | Self::Malformed { command, .. } => command,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Anything that can answer a CLI invocation with a JSON document.
///
/// Orchestrators only ever talk to this trait, which lets tests drive them
/// with scripted responses instead of a real `aws` binary.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `<tool> <args...> --output json` and return the parsed stdout
    async fn run(&self, args: &[&str]) -> Result<Value, CliError>;
}

/// The real `aws` CLI
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    timeout: Duration,
}

impl AwsCli {
    pub fn new() -> Self {
        Self {
            program: "aws".to_string(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Build from user configuration (binary name and call timeout)
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_program(&config.effective_binary())
            .with_timeout(config.call_timeout())
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for AwsCli {
    async fn run(&self, args: &[&str]) -> Result<Value, CliError> {
        let command = describe_command(args);

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .args(["--output", "json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Running: {} {} --output json", self.program, args.join(" "));

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| CliError::Invocation {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                tracing::warn!("{} {} timed out after {:?}", self.program, command, self.timeout);
                return Err(CliError::Timeout {
                    command,
                    after: self.timeout,
                });
            },
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::debug!(
                "{} {} exited with {:?}: {}",
                self.program,
                command,
                output.status.code(),
                truncate_for_log(&stderr)
            );
            return Err(CliError::Tool { command, stderr });
        }

        parse_output(&command, &output.stdout)
    }
}

/// Parse captured stdout. Some operations print nothing on success; that is
/// a `null` document rather than an error.
pub fn parse_output(command: &str, stdout: &[u8]) -> Result<Value, CliError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(stdout).map_err(|source| CliError::Malformed {
        command: command.to_string(),
        source,
    })
}

/// `["ec2", "describe-vpcs", "--region", "x"]` -> `"ec2 describe-vpcs"`
fn describe_command(args: &[&str]) -> String {
    args.iter()
        .take_while(|a| !a.starts_with("--"))
        .take(2)
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_for_log(s: &str) -> String {
    let s = s.trim();
    if s.len() > MAX_LOG_STDERR_LENGTH {
        let cut = (0..=MAX_LOG_STDERR_LENGTH)
            .rev()
            .find(|i| s.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &s[..cut], s.len())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_command() {
        assert_eq!(
            describe_command(&["ec2", "describe-vpcs", "--region", "us-east-1"]),
            "ec2 describe-vpcs"
        );
        assert_eq!(describe_command(&["iam", "list-roles"]), "iam list-roles");
        assert_eq!(describe_command(&["sts"]), "sts");
    }

    #[test]
    fn test_parse_output_empty_is_null() {
        assert_eq!(parse_output("s3api get-bucket-policy", b"").unwrap(), Value::Null);
        assert_eq!(parse_output("x y", b"  \n").unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_output_malformed() {
        let err = parse_output("ec2 describe-vpcs", b"not json").unwrap_err();
        assert!(matches!(err, CliError::Malformed { .. }));
        assert!(err.to_string().starts_with("aws ec2 describe-vpcs:"));
    }

    #[test]
    fn test_tool_error_display_trims_stderr() {
        let err = CliError::Tool {
            command: "ec2 describe-vpcs".to_string(),
            stderr: "\nAn error occurred (UnauthorizedOperation)\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "aws ec2 describe-vpcs: An error occurred (UnauthorizedOperation)"
        );
    }

    #[test]
    fn test_timeout_error_display() {
        let err = CliError::Timeout {
            command: "iam list-roles".to_string(),
            after: Duration::from_secs(30),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "aws iam list-roles: timed out after 30s");
    }

    #[test]
    fn test_truncate_for_log() {
        let long = "x".repeat(500);
        let out = truncate_for_log(&long);
        assert!(out.contains("[truncated, 500 bytes total]"));
        assert_eq!(truncate_for_log(" short \n"), "short");
    }

    // `sh -c <script> --output json` binds the appended flag to $0/$1, so a
    // shell stands in for the real binary.
    #[cfg(unix)]
    mod process {
        use super::*;

        fn sh() -> AwsCli {
            AwsCli::new().with_program("sh").with_timeout(Duration::from_secs(10))
        }

        #[tokio::test]
        async fn test_run_success_parses_json() {
            let value = sh()
                .run(&["-c", r#"echo '{"Vpcs": [{"VpcId": "vpc-1"}]}'"#])
                .await
                .unwrap();
            assert_eq!(value["Vpcs"][0]["VpcId"], "vpc-1");
        }

        #[tokio::test]
        async fn test_run_appends_output_flag() {
            let value = sh().run(&["-c", r#"echo "[\"$0\", \"$1\"]""#]).await.unwrap();
            assert_eq!(value, serde_json::json!(["--output", "json"]));
        }

        #[tokio::test]
        async fn test_run_nonzero_exit_is_tool_error() {
            let err = sh()
                .run(&["-c", "echo 'access denied' >&2; exit 254"])
                .await
                .unwrap_err();
            match err {
                CliError::Tool { stderr, .. } => assert_eq!(stderr, "access denied\n"),
                other => panic!("expected Tool error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_run_missing_binary_is_invocation_error() {
            let cli = AwsCli::new().with_program("definitely-not-a-real-binary-4711");
            let err = cli.run(&["ec2", "describe-vpcs"]).await.unwrap_err();
            assert!(matches!(err, CliError::Invocation { .. }));
            assert_eq!(err.command(), "ec2 describe-vpcs");
        }

        #[tokio::test]
        async fn test_run_deadline_is_timeout_error() {
            let cli = sh().with_timeout(Duration::from_millis(100));
            let err = cli.run(&["-c", "sleep 5"]).await.unwrap_err();
            assert!(err.is_timeout());
        }
    }
}
