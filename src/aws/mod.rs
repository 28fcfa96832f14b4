//! AWS CLI interaction module
//!
//! Everything this crate learns about an account comes from the `aws` command
//! line tool. This module owns that boundary: spawning the tool, classifying
//! its failures, detecting how it is configured, and discovering regions.
//!
//! # Module Structure
//!
//! - [`cli`] - Process runner (`aws <args> --output json`) and its error taxonomy
//! - [`detect`] - Installed version, configured region/profile, account id
//! - [`regions`] - Region display names and live region discovery
//!
//! # Example
//!
//! ```ignore
//! use cloudsnap::aws::{AwsCli, CommandRunner};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let cli = AwsCli::new();
//!     let vpcs = cli.run(&["ec2", "describe-vpcs", "--region", "us-east-1"]).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod detect;
pub mod regions;

pub use cli::{AwsCli, CliError, CommandRunner};
