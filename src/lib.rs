//! disque-router library
//!
//! Client-side router for Disque job-queue clusters. Discovers cluster
//! membership, keeps one connection per node and sends each command to the
//! node that produced the jobs it names.

pub mod cli_mode;
pub mod client;
pub mod cluster;
pub mod config;
pub mod router;
pub mod routing;
pub mod utils;

pub use client::{ClusterEvent, Connection, ConnectionFactory, NodeConnection};
pub use cluster::{NodeRecord, Topology};
pub use config::{ConnectionOptions, MembershipQuery, RouterConfig, ServerAddress};
pub use router::DisqueRouter;
pub use routing::{AffinityDescriptor, Command};
pub use utils::{DisqueError, RespValue, Result};
