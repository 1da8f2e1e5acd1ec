//! Job-ID affinity routing
//!
//! A Disque job ID embeds the 8-character ID prefix of the node that created
//! it at character offset 2. Commands naming job IDs go to the node owning
//! most of them; everything else goes to a random node.

use std::collections::HashSet;

use tracing::debug;

use super::commands::AffinityDescriptor;
use crate::client::Connection;
use crate::cluster::{Topology, NODE_PREFIX_LEN};

/// Offset of the node prefix inside a job ID
const JOB_PREFIX_OFFSET: usize = 2;

/// Node ID prefix embedded in a job ID; shorter IDs yield what is there
pub fn job_node_prefix(job_id: &str) -> &str {
    let mut indices = job_id.char_indices().map(|(i, _)| i).chain([job_id.len()]);
    let start = indices.nth(JOB_PREFIX_OFFSET).unwrap_or(job_id.len());
    let end = indices.nth(NODE_PREFIX_LEN - 1).unwrap_or(job_id.len());
    &job_id[start..end]
}

/// Arguments that hold job IDs according to `descriptor`
pub fn extract_job_ids(descriptor: AffinityDescriptor, args: &[String]) -> Vec<&str> {
    if !descriptor.repeating {
        return args.first().map(String::as_str).into_iter().collect();
    }
    args.iter()
        .step_by(descriptor.stride.max(1))
        .map(String::as_str)
        .collect()
}

/// Choose the connection for a command.
///
/// Returns `None` only when the topology has no connections at all.
pub fn select_connection(
    topology: &Topology,
    descriptor: Option<AffinityDescriptor>,
    args: &[String],
) -> Option<Connection> {
    let Some(descriptor) = descriptor else {
        return random(topology);
    };

    let job_ids = extract_job_ids(descriptor, args);
    match job_ids.as_slice() {
        [] => random(topology),
        [job_id] => {
            let prefix = job_node_prefix(job_id);
            match topology.node(prefix) {
                Some(conn) => {
                    debug!("Job {} -> {}", job_id, conn.address());
                    Some(conn.clone())
                }
                None => random(topology),
            }
        }
        many => match plurality_prefix(topology, many) {
            Some(prefix) => {
                let conn = topology.node(prefix).cloned();
                if let Some(ref conn) = conn {
                    debug!("{} job IDs -> {} ({})", many.len(), conn.address(), prefix);
                }
                conn
            }
            None => random(topology),
        },
    }
}

/// Known prefix named by the most job IDs; ties go to the one seen first
fn plurality_prefix<'a>(topology: &Topology, job_ids: &[&'a str]) -> Option<&'a str> {
    // Insertion order doubles as the tie-break order
    let mut tally: Vec<(&'a str, usize)> = Vec::new();
    for &job_id in job_ids {
        let prefix = job_node_prefix(job_id);
        if topology.node(prefix).is_none() {
            continue;
        }
        match tally.iter_mut().find(|(p, _)| *p == prefix) {
            Some((_, count)) => *count += 1,
            None => tally.push((prefix, 1)),
        }
    }

    let mut best: Option<(&'a str, usize)> = None;
    for (prefix, count) in tally {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((prefix, count));
        }
    }
    best.map(|(prefix, _)| prefix)
}

fn random(topology: &Topology) -> Option<Connection> {
    topology.random_connection(&HashSet::new())
}
