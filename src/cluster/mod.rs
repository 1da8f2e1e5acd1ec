//! Cluster topology and node management
//!
//! This module provides:
//! - Membership parsing for `HELLO` and `CLUSTER NODES` replies
//! - Immutable topology snapshots indexed by address and node ID prefix
//! - Single-flight topology refresh with connection reconciliation

pub mod node;
pub mod topology;
pub mod topology_manager;

pub use node::{node_id_prefix, parse_membership, NodeRecord, NODE_PREFIX_LEN};
pub use topology::Topology;
pub(crate) use topology::TopologyBuilder;
pub use topology_manager::{RefreshResult, TopologyManager};
