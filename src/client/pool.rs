//! Connection pool keyed by node address
//!
//! Holds exactly one connection per "host:port". Connections are created on
//! first reference and dropped when discovery stops reporting their address.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::connection::{
    Connection, ConnectionEvents, ConnectionFactory, PooledConnection, TransportReport,
};
use crate::cluster::Topology;
use crate::utils::ConnectionError;

/// Transport notification delivered to subscribers
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// A node could not be reached; a topology refresh has been triggered
    ConnectionError {
        error: ConnectionError,
        connection: Option<Connection>,
    },
    /// Any other transport error, passed through unchanged
    Error {
        error: ConnectionError,
        connection: Option<Connection>,
    },
}

impl ClusterEvent {
    pub fn error(&self) -> &ConnectionError {
        match self {
            ClusterEvent::ConnectionError { error, .. } | ClusterEvent::Error { error, .. } => {
                error
            }
        }
    }

    pub fn connection(&self) -> Option<&Connection> {
        match self {
            ClusterEvent::ConnectionError { connection, .. }
            | ClusterEvent::Error { connection, .. } => connection.as_ref(),
        }
    }

    /// Whether this event signals a topology change
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ClusterEvent::ConnectionError { .. })
    }
}

pub struct ConnectionPool {
    factory: Arc<dyn ConnectionFactory>,
    registry: Mutex<HashMap<String, Connection>>,
    events_tx: mpsc::UnboundedSender<TransportReport>,
}

impl ConnectionPool {
    /// Create a pool; transport errors from its connections arrive on the
    /// returned receiver.
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportReport>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pool = Self {
            factory,
            registry: Mutex::new(HashMap::new()),
            events_tx,
        };
        (pool, events_rx)
    }

    /// Get the connection for `host:port`, creating it on first use
    pub fn get_connection(&self, host: &str, port: u16) -> Connection {
        let address = format!("{}:{}", host, port);
        let mut registry = self.registry.lock();

        if let Some(conn) = registry.get(&address) {
            return Arc::clone(conn);
        }

        debug!("Opening connection to {}", address);
        let events = ConnectionEvents::new(address.clone(), self.events_tx.clone());
        let client = self.factory.create(host, port, events);
        let conn = Arc::new(PooledConnection::new(host, port, client));
        registry.insert(address, Arc::clone(&conn));
        conn
    }

    /// Existing connection for an address
    pub fn get(&self, address: &str) -> Option<Connection> {
        self.registry.lock().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    /// Remove every connection whose address is absent from `keep`.
    ///
    /// The removed connections are returned so the caller can close them.
    pub(crate) fn retain(&self, keep: &Topology) -> Vec<Connection> {
        let mut registry = self.registry.lock();
        let stale: Vec<String> = registry
            .keys()
            .filter(|address| !keep.contains_address(address))
            .cloned()
            .collect();

        stale
            .into_iter()
            .filter_map(|address| registry.remove(&address))
            .collect()
    }

    /// Turn a transport report into the event subscribers see
    pub fn classify(&self, report: TransportReport) -> ClusterEvent {
        let connection = self.get(&report.address);
        if report.error.is_connect_failure() {
            ClusterEvent::ConnectionError {
                error: report.error,
                connection,
            }
        } else {
            ClusterEvent::Error {
                error: report.error,
                connection,
            }
        }
    }

    /// Close all pooled connections concurrently.
    ///
    /// Resolves once every connection has acknowledged the close.
    pub async fn quit(&self) {
        let connections: Vec<Connection> = self.registry.lock().drain().map(|(_, c)| c).collect();
        if connections.is_empty() {
            return;
        }

        info!("Closing {} connection(s)", connections.len());
        join_all(connections.iter().map(|c| c.quit())).await;
    }
}
