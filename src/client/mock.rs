//! In-memory cluster for unit tests
//!
//! Every mock connection answers membership queries from a scripted reply and
//! echoes its own address for any other command, which makes routing
//! decisions visible in assertions.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::connection::{ConnectionEvents, ConnectionFactory, NodeConnection};
use crate::utils::{ConnectionError, RespValue};

/// A command observed by a mock connection
#[derive(Debug, Clone)]
pub(crate) struct SentCommand {
    pub address: String,
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Default)]
struct MockState {
    default_membership: Option<RespValue>,
    membership: HashMap<String, Result<RespValue, ConnectionError>>,
    panic_once: HashSet<String>,
    quit_delays: HashMap<String, Duration>,
    events: HashMap<String, ConnectionEvents>,
    sent: Vec<SentCommand>,
    created: Vec<String>,
    closed: Vec<String>,
}

#[derive(Clone, Default)]
pub(crate) struct MockCluster {
    state: Arc<Mutex<MockState>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Arc<MockFactory> {
        Arc::new(MockFactory {
            state: Arc::clone(&self.state),
        })
    }

    /// Reply every node gives to a membership query
    pub fn set_membership(&self, reply: RespValue) {
        self.state.lock().default_membership = Some(reply);
    }

    /// Make one node fail membership queries as unreachable
    pub fn fail_membership(&self, address: &str) {
        let (host, port) = split_address(address);
        let err = ConnectionError::connect_failed(
            &host,
            port,
            io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
        );
        self.state
            .lock()
            .membership
            .insert(address.to_string(), Err(err));
    }

    /// Make one node's next membership query panic
    pub fn panic_next_membership(&self, address: &str) {
        self.state.lock().panic_once.insert(address.to_string());
    }

    pub fn set_quit_delay(&self, address: &str, delay: Duration) {
        self.state
            .lock()
            .quit_delays
            .insert(address.to_string(), delay);
    }

    /// Emit a transport error through a connection's observer
    pub fn report(&self, address: &str, error: ConnectionError) {
        let events = self.state.lock().events.get(address).cloned();
        events
            .unwrap_or_else(|| panic!("no mock connection for {}", address))
            .report(error);
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.state.lock().sent.clone()
    }

    /// Non-membership commands, as (address, name)
    pub fn routed(&self) -> Vec<(String, String)> {
        self.sent()
            .into_iter()
            .filter(|c| !is_membership_query(&c.name))
            .map(|c| (c.address, c.name))
            .collect()
    }

    pub fn membership_queries(&self) -> usize {
        self.sent()
            .iter()
            .filter(|c| is_membership_query(&c.name))
            .count()
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().created.clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.state.lock().closed.clone()
    }
}

pub(crate) struct MockFactory {
    state: Arc<Mutex<MockState>>,
}

impl ConnectionFactory for MockFactory {
    fn create(&self, host: &str, port: u16, events: ConnectionEvents) -> Arc<dyn NodeConnection> {
        let address = format!("{}:{}", host, port);
        let mut state = self.state.lock();
        state.created.push(address.clone());
        state.events.insert(address.clone(), events);
        Arc::new(MockConnection {
            address,
            state: Arc::clone(&self.state),
        })
    }
}

struct MockConnection {
    address: String,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl NodeConnection for MockConnection {
    async fn send_command(
        &self,
        name: &str,
        args: &[String],
    ) -> Result<RespValue, ConnectionError> {
        self.state.lock().sent.push(SentCommand {
            address: self.address.clone(),
            name: name.to_string(),
            args: args.to_vec(),
        });

        // Give concurrent callers a chance to interleave
        tokio::task::yield_now().await;

        if !is_membership_query(name) {
            return Ok(RespValue::SimpleString(self.address.clone()));
        }

        let panics = self.state.lock().panic_once.remove(&self.address);
        if panics {
            panic!("scripted membership panic on {}", self.address);
        }

        let state = self.state.lock();
        match state.membership.get(&self.address) {
            Some(reply) => reply.clone(),
            None => state
                .default_membership
                .clone()
                .ok_or_else(|| ConnectionError::Server("ERR no membership scripted".to_string())),
        }
    }

    async fn quit(&self) {
        let delay = self.state.lock().quit_delays.get(&self.address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().closed.push(self.address.clone());
    }
}

fn is_membership_query(name: &str) -> bool {
    name.eq_ignore_ascii_case("HELLO") || name.to_ascii_uppercase().starts_with("CLUSTER")
}

fn split_address(address: &str) -> (String, u16) {
    let (host, port) = address.rsplit_once(':').unwrap_or((address, "0"));
    (host.to_string(), port.parse().unwrap_or(0))
}

/// Build a HELLO reply from (node id, host, port)
pub(crate) fn hello_reply(nodes: &[(&str, &str, u16)]) -> RespValue {
    let bulk = |s: &str| RespValue::BulkString(s.as_bytes().to_vec());
    let my_id = nodes.first().map(|n| n.0).unwrap_or("");
    let mut items = vec![RespValue::Integer(1), bulk(my_id)];
    for (id, host, port) in nodes {
        items.push(RespValue::Array(vec![
            bulk(id),
            bulk(host),
            bulk(&port.to_string()),
            bulk("1"),
        ]));
    }
    RespValue::Array(items)
}

/// Node IDs are 40 chars in Disque; pad a prefix out to that length
pub(crate) fn node_id(prefix: &str) -> String {
    format!("{:0<40}", prefix)
}

/// A job ID produced by the node with the given 8-char prefix
pub(crate) fn job_id(prefix: &str, seq: u32) -> String {
    format!("D-{}-{:016}-0001", prefix, seq)
}
