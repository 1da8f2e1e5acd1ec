//! Command routing by job-ID affinity

pub mod affinity;
pub mod commands;

pub use affinity::{extract_job_ids, job_node_prefix, select_connection};
pub use commands::{AffinityDescriptor, Command};
