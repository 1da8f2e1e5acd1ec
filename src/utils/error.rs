//! Error types for disque-router
//!
//! Every error here is `Clone`: a single discovery outcome is handed to all
//! callers waiting on the same refresh.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Top-level router error
#[derive(Error, Debug, Clone)]
pub enum DisqueError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("couldn't get client")]
    NoConnectionAvailable,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

impl DisqueError {
    /// True when the router could not pick any connection
    pub fn is_no_connection(&self) -> bool {
        matches!(self, DisqueError::NoConnectionAvailable)
    }
}

/// Transport-level errors reported by a node connection
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    #[error("could not establish connection to node {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        source: Arc<io::Error>,
    },

    #[error("Connect timeout after {0}ms")]
    Timeout(u64),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("Connection closed")]
    Closed,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ConnectionError {
    /// Build a connect failure for `host:port`
    pub fn connect_failed(host: &str, port: u16, source: io::Error) -> Self {
        ConnectionError::ConnectFailed {
            host: host.to_string(),
            port,
            source: Arc::new(source),
        }
    }

    /// Whether this error means the node could not be reached at all.
    ///
    /// Only these failures are treated as a topology signal.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            ConnectionError::ConnectFailed { .. } | ConnectionError::Timeout(_)
        )
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        ConnectionError::Io(Arc::new(err))
    }
}

/// RESP protocol errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Malformed reply: {0}")]
    Parse(String),
}

/// Cluster membership errors
#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    #[error("Failed to parse membership response: {0}")]
    ParseFailed(String),

    #[error("couldn't get nodes (tried {attempted} node(s))")]
    DiscoveryExhausted { attempted: usize },

    #[error("topology refresh aborted unexpectedly")]
    RefreshAborted,

    #[error("router has been shut down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, DisqueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failure_classification() {
        let err = ConnectionError::connect_failed(
            "10.0.0.1",
            7711,
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert!(err.is_connect_failure());
        assert!(err
            .to_string()
            .starts_with("could not establish connection to node 10.0.0.1:7711"));

        assert!(!ConnectionError::Closed.is_connect_failure());
        assert!(!ConnectionError::Server("ERR".to_string()).is_connect_failure());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DisqueError::NoConnectionAvailable.to_string(),
            "couldn't get client"
        );
        let err: DisqueError = ClusterError::DiscoveryExhausted { attempted: 2 }.into();
        assert!(err.to_string().contains("couldn't get nodes"));
    }
}
