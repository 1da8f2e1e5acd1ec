//! Router configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// A `host:port` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = String;

    /// Parse "host:port"; IPv6 hosts keep their colons ("::1:7711")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("Invalid address '{}': expected host:port", s))?;
        if host.is_empty() {
            return Err(format!("Invalid address '{}': empty host", s));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| format!("Invalid port in address '{}'", s))?;
        Ok(Self::new(host, port))
    }
}

/// Which command is used to ask a node for cluster membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MembershipQuery {
    /// `HELLO`: structured `[id, host, port, priority]` tuples
    #[default]
    Hello,
    /// `CLUSTER NODES`: newline-delimited text block
    ClusterNodes,
}

impl MembershipQuery {
    pub fn command(&self) -> &'static str {
        match self {
            MembershipQuery::Hello => "HELLO",
            MembershipQuery::ClusterNodes => "CLUSTER NODES",
        }
    }
}

/// Options handed to the default connection factory
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub password: Option<String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            read_timeout_ms: 30000,
            password: None,
        }
    }
}

impl ConnectionOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Complete router configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Seed nodes; discovery replaces them with the reported membership
    pub servers: Vec<ServerAddress>,
    /// Periodic topology refresh interval in milliseconds
    #[serde(default)]
    pub node_interval_ms: Option<u64>,
    #[serde(default)]
    pub membership_query: MembershipQuery,
    #[serde(default, rename = "redis_options")]
    pub connection: ConnectionOptions,
}

impl RouterConfig {
    pub fn new(servers: Vec<ServerAddress>) -> Self {
        Self {
            servers,
            node_interval_ms: None,
            membership_query: MembershipQuery::default(),
            connection: ConnectionOptions::default(),
        }
    }

    /// Refresh topology every `interval`
    pub fn with_node_interval(mut self, interval: Duration) -> Self {
        self.node_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn with_membership_query(mut self, query: MembershipQuery) -> Self {
        self.membership_query = query;
        self
    }

    pub fn with_connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection = options;
        self
    }

    /// Interval for the background refresher; zero disables it
    pub fn node_interval(&self) -> Option<Duration> {
        self.node_interval_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), String> {
        if self.servers.is_empty() {
            return Err("at least one server is required".to_string());
        }
        if let Some(bad) = self.servers.iter().find(|s| s.host.is_empty()) {
            return Err(format!("server '{}' has an empty host", bad));
        }
        Ok(())
    }
}

/// A plain server list is shorthand for `RouterConfig { servers, .. }`
impl From<Vec<ServerAddress>> for RouterConfig {
    fn from(servers: Vec<ServerAddress>) -> Self {
        Self::new(servers)
    }
}
