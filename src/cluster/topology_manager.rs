//! Dynamic cluster topology manager
//!
//! Owns the connection pool and the current `Topology` snapshot. Discovery
//! asks a random node for cluster membership, builds a new snapshot, closes
//! connections to nodes that disappeared and swaps the snapshot in.
//!
//! Refreshes are single-flight: while one round-trip is outstanding every
//! other refresh request joins it and receives the same result.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{self, join_all, BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::node::{parse_membership, NodeRecord};
use super::topology::{Topology, TopologyBuilder};
use crate::client::{ClusterEvent, ConnectionFactory, ConnectionPool, TransportReport};
use crate::config::{MembershipQuery, RouterConfig};
use crate::utils::{ClusterError, DisqueError};

/// Outcome of one discovery round-trip, shared by all of its waiters
pub type RefreshResult = Result<Arc<Topology>, DisqueError>;

type RefreshFlight = Shared<BoxFuture<'static, RefreshResult>>;

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct TopologyManager {
    /// One connection per node address
    pool: ConnectionPool,

    /// Current snapshot, replaced whole by each successful discovery
    topology: RwLock<Arc<Topology>>,

    /// Discovery round-trip in progress, if any
    in_flight: Mutex<Option<RefreshFlight>>,

    membership_query: MembershipQuery,

    /// Transport events for subscribers
    events: broadcast::Sender<ClusterEvent>,

    /// Event loop and interval refresher
    tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Set by `shutdown`; no snapshot is installed afterwards
    closed: AtomicBool,
}

impl TopologyManager {
    /// Seed the pool from `config.servers` and start background work.
    ///
    /// The first discovery is started before this returns. Must be called
    /// from within a tokio runtime.
    pub fn start(factory: Arc<dyn ConnectionFactory>, config: &RouterConfig) -> Arc<Self> {
        let (pool, reports) = ConnectionPool::new(factory);
        let seeds = config
            .servers
            .iter()
            .map(|server| pool.get_connection(&server.host, server.port))
            .collect();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let manager = Arc::new(Self {
            pool,
            topology: RwLock::new(Arc::new(Topology::seed(seeds))),
            in_flight: Mutex::new(None),
            membership_query: config.membership_query,
            events,
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        let mut tasks = vec![Self::spawn_event_loop(Arc::downgrade(&manager), reports)];
        if let Some(period) = config.node_interval() {
            debug!("Refreshing topology every {:?}", period);
            tasks.push(Self::spawn_interval_refresh(Arc::downgrade(&manager), period));
        }
        *manager.tasks.lock() = tasks;

        manager.trigger_refresh();
        manager
    }

    /// Current topology snapshot
    pub fn topology(&self) -> Arc<Topology> {
        Arc::clone(&self.topology.read())
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Whether a discovery round-trip is outstanding
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refresh cluster topology
    ///
    /// Joins the outstanding discovery if there is one, otherwise starts a
    /// new one. All concurrent callers get the same result.
    pub async fn refresh(self: &Arc<Self>) -> RefreshResult {
        self.join_or_start().await
    }

    /// Start a refresh in the background, joining any outstanding one
    pub fn trigger_refresh(self: &Arc<Self>) {
        drop(self.join_or_start());
    }

    fn join_or_start(self: &Arc<Self>) -> RefreshFlight {
        if self.is_closed() {
            let closed: RefreshResult = Err(ClusterError::Closed.into());
            return future::ready(closed).boxed().shared();
        }

        let mut slot = self.in_flight.lock();
        if let Some(flight) = slot.as_ref() {
            debug!("Joining in-flight topology refresh");
            return flight.clone();
        }

        let manager = Arc::clone(self);
        let flight = async move {
            // A panic must not leave a poisoned flight in the slot
            let result = AssertUnwindSafe(manager.discover())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!("Topology refresh panicked");
                    Err(ClusterError::RefreshAborted.into())
                });
            *manager.in_flight.lock() = None;
            result
        }
        .boxed()
        .shared();

        *slot = Some(flight.clone());
        // Drive to completion even if every caller stops waiting
        tokio::spawn(flight.clone());
        flight
    }

    /// Query random nodes until one answers with a usable membership list
    async fn discover(&self) -> RefreshResult {
        let current = self.topology();
        let query = self.membership_query.command();
        let mut excluded: HashSet<String> = HashSet::new();

        loop {
            if self.is_closed() {
                return Err(ClusterError::Closed.into());
            }

            let Some(conn) = current.random_connection(&excluded) else {
                warn!(
                    "Failed to refresh cluster topology: {} node(s) tried",
                    excluded.len()
                );
                return Err(ClusterError::DiscoveryExhausted {
                    attempted: excluded.len(),
                }
                .into());
            };

            debug!("Fetching topology from {} with {}", conn.address(), query);
            let nodes = match conn.send_command(query, &[]).await {
                Ok(reply) => parse_membership(&reply).map_err(DisqueError::from),
                Err(e) => Err(DisqueError::from(e)),
            };

            match nodes {
                Ok(nodes) => return self.install(nodes).await,
                Err(e) => {
                    warn!("Failed to fetch topology from {}: {}", conn.address(), e);
                    excluded.insert(conn.address().to_string());
                }
            }
        }
    }

    /// Build and publish a snapshot from fresh membership, then close
    /// connections the cluster no longer reports.
    async fn install(&self, nodes: Vec<NodeRecord>) -> RefreshResult {
        let (topology, stale) = {
            // Held until the swap; `shutdown` sets `closed` under this lock
            let mut current = self.topology.write();
            if self.is_closed() {
                debug!("Router closed, discarding discovered topology");
                return Err(ClusterError::Closed.into());
            }

            let mut builder = TopologyBuilder::default();
            for record in nodes {
                let conn = self.pool.get_connection(&record.host, record.port);
                conn.attach(Arc::new(record));
                builder.insert(conn);
            }

            let topology = Arc::new(builder.build(current.version() + 1));
            *current = Arc::clone(&topology);
            let stale = self.pool.retain(&topology);
            (topology, stale)
        };

        info!(
            "Cluster topology refreshed: {} nodes, {} removed",
            topology.num_nodes(),
            stale.len()
        );
        for conn in &stale {
            debug!("Closing connection to departed node {}", conn.address());
        }
        join_all(stale.iter().map(|conn| conn.quit())).await;

        Ok(topology)
    }

    /// Classify a transport report, publish it and refresh on connect failures
    fn handle_report(self: &Arc<Self>, report: TransportReport) {
        let address = report.address.clone();
        let event = self.pool.classify(report);

        if event.is_connection_error() {
            warn!("Node {} unreachable, refreshing topology", address);
            self.trigger_refresh();
        }

        if let Err(broadcast::error::SendError(event)) = self.events.send(event) {
            warn!("Unobserved error on {}: {}", address, event.error());
        }
    }

    fn spawn_event_loop(
        manager: Weak<Self>,
        mut reports: mpsc::UnboundedReceiver<TransportReport>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(report) = reports.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.handle_report(report);
            }
        })
    }

    fn spawn_interval_refresh(manager: Weak<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately; startup already refreshed
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if let Err(e) = manager.refresh().await {
                    warn!("Periodic topology refresh failed: {}", e);
                }
            }
        })
    }

    /// Stop background tasks and close every connection.
    ///
    /// The topology is emptied first so no further command is routed to a
    /// closing connection. A discovery still in flight finds the router
    /// closed and installs nothing.
    pub async fn shutdown(&self) {
        self.abort_tasks();
        {
            let mut topology = self.topology.write();
            self.closed.store(true, Ordering::Release);
            *topology = Arc::new(Topology::default());
        }
        self.pool.quit().await;
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for TopologyManager {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
