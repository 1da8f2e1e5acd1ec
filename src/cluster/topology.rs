//! Cluster topology snapshot
//!
//! A `Topology` is immutable once built. Discovery assembles a new one with
//! `TopologyBuilder` and swaps it in whole, so readers never see a
//! half-updated view.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::client::Connection;

/// Point-in-time view of cluster membership
#[derive(Default)]
pub struct Topology {
    /// "host:port" -> connection
    connections: HashMap<String, Connection>,
    /// Node ID prefix -> connection
    nodes: HashMap<String, Connection>,
    /// Candidates for random selection, in membership order
    node_list: Vec<Connection>,
    /// 0 for the seed view, incremented by each successful discovery
    version: u64,
}

impl Topology {
    /// Initial view built from configured servers; no node identities yet
    pub fn seed(connections: Vec<Connection>) -> Self {
        let mut builder = TopologyBuilder::default();
        for conn in connections {
            builder.insert(conn);
        }
        builder.build(0)
    }

    /// Connection for an address
    pub fn connection(&self, address: &str) -> Option<&Connection> {
        self.connections.get(address)
    }

    /// Connection owning a node ID prefix
    pub fn node(&self, prefix: &str) -> Option<&Connection> {
        self.nodes.get(prefix)
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.connections.contains_key(address)
    }

    /// All connections, in membership order
    pub fn node_list(&self) -> &[Connection] {
        &self.node_list
    }

    /// Known node ID prefixes
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// True once a discovery round has populated node identities
    pub fn is_discovered(&self) -> bool {
        self.version > 0
    }

    /// Pick a connection uniformly at random, skipping excluded addresses
    pub fn random_connection(&self, exclude: &HashSet<String>) -> Option<Connection> {
        let candidates: Vec<&Connection> = self
            .node_list
            .iter()
            .filter(|c| !exclude.contains(c.address()))
            .collect();

        if candidates.is_empty() {
            return None;
        }
        Some(candidates[fastrand::usize(..candidates.len())].clone())
    }
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addresses: Vec<&str> = self.node_list.iter().map(|c| c.address()).collect();
        f.debug_struct("Topology")
            .field("version", &self.version)
            .field("nodes", &addresses)
            .finish()
    }
}

/// Accumulates connections for a new snapshot
#[derive(Default)]
pub(crate) struct TopologyBuilder {
    connections: HashMap<String, Connection>,
    nodes: HashMap<String, Connection>,
    node_list: Vec<Connection>,
}

impl TopologyBuilder {
    /// Index a connection by address and, when it has a node record, by prefix
    pub fn insert(&mut self, conn: Connection) {
        if let Some(prefix) = conn.node_prefix() {
            self.nodes.insert(prefix, conn.clone());
        }
        if self
            .connections
            .insert(conn.address().to_string(), conn.clone())
            .is_none()
        {
            self.node_list.push(conn);
        }
    }

    pub fn build(self, version: u64) -> Topology {
        Topology {
            connections: self.connections,
            nodes: self.nodes,
            node_list: self.node_list,
            version,
        }
    }
}
