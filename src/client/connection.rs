//! Node connection abstraction
//!
//! The router never talks to sockets directly. It holds `PooledConnection`
//! handles wrapping any `NodeConnection`, so the wire client can be swapped:
//! - `RawConnection`: built-in RESP over TCP
//! - anything an embedder or a test provides through `ConnectionFactory`

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::cluster::NodeRecord;
use crate::utils::{ConnectionError, RespValue};

/// A live client for one backend node
#[async_trait]
pub trait NodeConnection: Send + Sync {
    /// Send a command and wait for its reply.
    ///
    /// Server error replies are returned as `ConnectionError::Server`.
    async fn send_command(&self, name: &str, args: &[String])
        -> Result<RespValue, ConnectionError>;

    /// Close the connection; resolves once the close is acknowledged
    async fn quit(&self);
}

/// Creates node connections on demand
///
/// `events` is the error observer for the new connection: transport failures
/// that happen outside a command call must be reported through it.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self, host: &str, port: u16, events: ConnectionEvents) -> Arc<dyn NodeConnection>;
}

/// Transport failure reported by a connection
#[derive(Debug, Clone)]
pub struct TransportReport {
    pub address: String,
    pub error: ConnectionError,
}

/// Sink through which a connection reports transport errors to its pool
#[derive(Debug, Clone)]
pub struct ConnectionEvents {
    address: String,
    tx: mpsc::UnboundedSender<TransportReport>,
}

impl ConnectionEvents {
    pub(crate) fn new(address: String, tx: mpsc::UnboundedSender<TransportReport>) -> Self {
        Self { address, tx }
    }

    /// A sink not attached to any pool; reports are dropped
    pub fn detached(address: impl Into<String>) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self {
            address: address.into(),
            tx,
        }
    }

    /// Address of the connection this sink belongs to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Report a transport error
    pub fn report(&self, error: ConnectionError) {
        let report = TransportReport {
            address: self.address.clone(),
            error,
        };
        if let Err(e) = self.tx.send(report) {
            debug!(
                "Transport error on {} after pool shutdown: {}",
                self.address, e.0.error
            );
        }
    }
}

/// Pooled handle to one node, shared by the pool and topology snapshots
pub type Connection = Arc<PooledConnection>;

pub struct PooledConnection {
    host: String,
    port: u16,
    address: String,
    client: Arc<dyn NodeConnection>,
    /// Set by discovery; `None` until the node reports its identity
    node: RwLock<Option<Arc<NodeRecord>>>,
}

impl PooledConnection {
    pub(crate) fn new(host: &str, port: u16, client: Arc<dyn NodeConnection>) -> Self {
        Self {
            host: host.to_string(),
            port,
            address: format!("{}:{}", host, port),
            client,
            node: RwLock::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Pool key, "host:port"
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Node record attached by the last discovery that reported this address
    pub fn node(&self) -> Option<Arc<NodeRecord>> {
        self.node.read().clone()
    }

    pub fn node_prefix(&self) -> Option<String> {
        self.node.read().as_ref().map(|n| n.id_prefix.clone())
    }

    pub(crate) fn attach(&self, record: Arc<NodeRecord>) {
        *self.node.write() = Some(record);
    }

    pub async fn send_command(
        &self,
        name: &str,
        args: &[String],
    ) -> Result<RespValue, ConnectionError> {
        self.client.send_command(name, args).await
    }

    pub async fn quit(&self) {
        self.client.quit().await
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("address", &self.address)
            .field("node", &self.node.read().as_ref().map(|n| n.id.clone()))
            .finish()
    }
}
