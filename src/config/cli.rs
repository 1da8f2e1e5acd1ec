//! Command-line argument parsing

use clap::Parser;
use std::fs;
use std::path::PathBuf;

use super::router_config::{MembershipQuery, RouterConfig, ServerAddress};

/// Disque listens here unless told otherwise
pub const DEFAULT_SERVER: &str = "127.0.0.1:7711";

/// Job-affinity router and command-line client for Disque clusters
#[derive(Parser, Debug, Clone)]
#[command(name = "disque-router")]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    // ===== Cluster =====
    /// Seed node as host:port (can be specified multiple times)
    #[arg(short = 's', long = "server", action = clap::ArgAction::Append)]
    pub servers: Vec<ServerAddress>,

    /// JSON router configuration file; command-line flags override it
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Refresh topology every N milliseconds (0 disables)
    #[arg(long = "node-interval")]
    pub node_interval_ms: Option<u64>,

    /// Command used to ask a node for cluster membership
    #[arg(long = "membership-query", value_enum)]
    pub membership_query: Option<MembershipQuery>,

    // ===== Connection Options =====
    /// Password for AUTH command
    #[arg(short = 'a', long = "auth")]
    pub password: Option<String>,

    /// Connection timeout in milliseconds
    #[arg(long = "connect-timeout")]
    pub connect_timeout_ms: Option<u64>,

    /// Reply timeout in milliseconds
    #[arg(long = "read-timeout")]
    pub read_timeout_ms: Option<u64>,

    // ===== Mode =====
    /// Print the discovered cluster topology and exit
    #[arg(long = "nodes")]
    pub nodes: bool,

    /// Command to route and run; starts an interactive prompt when empty
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command_args: Vec<String>,

    // ===== Output =====
    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate argument combinations
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("--verbose and --quiet are mutually exclusive".to_string());
        }

        if self.connect_timeout_ms == Some(0) {
            return Err("--connect-timeout must be at least 1".to_string());
        }

        if self.read_timeout_ms == Some(0) {
            return Err("--read-timeout must be at least 1".to_string());
        }

        if self.nodes && !self.command_args.is_empty() {
            return Err("--nodes cannot be combined with a command".to_string());
        }

        Ok(())
    }

    /// Build the router configuration, starting from `--config` if given
    pub fn to_router_config(&self) -> Result<RouterConfig, String> {
        let mut config = match self.config {
            Some(ref path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
                serde_json::from_str::<RouterConfig>(&text)
                    .map_err(|e| format!("Invalid config {:?}: {}", path, e))?
            }
            None => RouterConfig::new(Vec::new()),
        };

        if !self.servers.is_empty() {
            config.servers = self.servers.clone();
        }
        if config.servers.is_empty() {
            config.servers.push(DEFAULT_SERVER.parse()?);
        }
        if let Some(ms) = self.node_interval_ms {
            config.node_interval_ms = Some(ms);
        }
        if let Some(query) = self.membership_query {
            config.membership_query = query;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connection.connect_timeout_ms = ms;
        }
        if let Some(ms) = self.read_timeout_ms {
            config.connection.read_timeout_ms = ms;
        }
        if self.password.is_some() {
            config.connection.password = self.password.clone();
        }

        config.validate()?;
        Ok(config)
    }
}
