//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use warden_authz::ProbeConfig;
use warden_telemetry::{LogConfig, LogFormat};

/// Default configuration file, used when it exists and `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "warden.toml";

/// Warden - access policy for ticket-tracker commands
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the policy document (TOML or JSON)
    #[arg(short, long, global = true, env = "WARDEN_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Organization alias (overrides current_organization)
    #[arg(long, global = true, value_name = "ALIAS")]
    pub org: Option<String>,

    /// Runtime profile: probe timeout and logging defaults
    #[arg(long, global = true, value_enum, default_value_t = Profile::Production)]
    pub profile: Profile,

    /// Log output format (defaults to the profile's)
    #[arg(long, global = true, value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print decision metrics in Prometheus text format to stderr on exit
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Runtime profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    /// JSON logs, short tracker timeout.
    Production,
    /// Pretty debug logs, generous tracker timeout.
    Development,
}

impl Profile {
    /// Probe settings for this profile.
    pub fn probe_config(self) -> ProbeConfig {
        match self {
            Self::Production => ProbeConfig::production(),
            Self::Development => ProbeConfig::development(),
        }
    }

    /// Logging settings for this profile.
    pub fn log_config(self) -> LogConfig {
        match self {
            Self::Production => LogConfig::production(),
            Self::Development => LogConfig::development(),
        }
    }
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Authorize a command on a project or issues
    Check(CheckArgs),

    /// Authorize a command on a content space
    CheckSpace(CheckSpaceArgs),

    /// Print the effective policy of the active organization as JSON
    Policy,

    /// Print the JQL a listing command must run under the active policy
    Scope(ScopeArgs),
}

/// Arguments for `check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Canonical command name, e.g. "issue view"
    #[arg(long)]
    pub command: String,

    /// Project key; every issue must belong to it
    #[arg(long)]
    pub project: Option<String>,

    /// Issue key; repeat to check a batch
    #[arg(long = "issue", value_name = "KEY")]
    pub issues: Vec<String>,

    /// Maximum concurrent tracker probes for a batch
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,
}

/// Arguments for `check-space`.
#[derive(Args, Debug)]
pub struct CheckSpaceArgs {
    /// Canonical command name, e.g. "page view"
    #[arg(long)]
    pub command: String,

    /// Space key
    #[arg(long)]
    pub space: String,
}

/// Arguments for `scope`.
#[derive(Args, Debug)]
pub struct ScopeArgs {
    /// Canonical listing command name, e.g. "issue list"
    #[arg(long)]
    pub command: String,

    /// The listing command's own JQL
    #[arg(long, default_value = "")]
    pub jql: String,
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    s.parse().map_err(|e: warden_telemetry::TelemetryError| e.to_string())
}
