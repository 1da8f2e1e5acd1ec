//! Command dispatcher
//!
//! `DisqueRouter` is the entry point: it owns the topology manager, picks a
//! connection for every command by job-ID affinity and forwards the reply.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::client::{ClusterEvent, Connection, ConnectionFactory, RawConnectionFactory};
use crate::cluster::{Topology, TopologyManager};
use crate::config::RouterConfig;
use crate::routing::{self, AffinityDescriptor, Command};
use crate::utils::{DisqueError, RespValue, Result};

/// Client for a Disque cluster.
///
/// Cloning is cheap; clones share connections and topology.
#[derive(Clone)]
pub struct DisqueRouter {
    manager: Arc<TopologyManager>,
}

/// One method per registry command, routed and direct-to-connection
macro_rules! command_methods {
    ($($method:ident, $client_method:ident => $command:ident;)*) => {
        $(
            pub async fn $method(&self, args: &[String]) -> Result<RespValue> {
                self.call(Command::$command, args).await
            }

            pub async fn $client_method(
                &self,
                connection: &Connection,
                args: &[String],
            ) -> Result<RespValue> {
                self.client_command(connection, Command::$command.as_str(), args)
                    .await
            }
        )*
    };
}

impl DisqueRouter {
    /// Connect using the built-in RESP client.
    ///
    /// Discovery starts immediately in the background. Must be called from
    /// within a tokio runtime.
    pub fn new(config: impl Into<RouterConfig>) -> Result<Self> {
        let config = config.into();
        let factory = Arc::new(RawConnectionFactory::new(config.connection.clone()));
        Self::with_factory(config, factory)
    }

    /// Connect using connections produced by `factory`
    pub fn with_factory(
        config: impl Into<RouterConfig>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Self> {
        let config = config.into();
        config.validate().map_err(DisqueError::Config)?;

        debug!(
            "Starting router with {} seed server(s)",
            config.servers.len()
        );
        Ok(Self {
            manager: TopologyManager::start(factory, &config),
        })
    }

    /// Refresh cluster membership, joining a refresh already in progress
    pub async fn refresh(&self) -> Result<Arc<Topology>> {
        self.manager.refresh().await
    }

    /// Current topology snapshot
    pub fn topology(&self) -> Arc<Topology> {
        self.manager.topology()
    }

    /// Connection a command named `name` would be sent to
    pub fn select_connection(&self, name: &str, args: &[String]) -> Option<Connection> {
        let topology = self.manager.topology();
        routing::select_connection(&topology, AffinityDescriptor::for_command(name), args)
    }

    /// Send a command to the node chosen by job-ID affinity.
    ///
    /// Names outside the registry are sent to a random node.
    pub async fn command(&self, name: &str, args: &[String]) -> Result<RespValue> {
        let connection = self
            .select_connection(name, args)
            .ok_or(DisqueError::NoConnectionAvailable)?;
        debug!("{} -> {}", name, connection.address());
        self.client_command(&connection, name, args).await
    }

    /// Send a registry command
    pub async fn call(&self, command: Command, args: &[String]) -> Result<RespValue> {
        self.command(command.as_str(), args).await
    }

    /// Send a command to a specific connection, bypassing routing
    pub async fn client_command(
        &self,
        connection: &Connection,
        name: &str,
        args: &[String],
    ) -> Result<RespValue> {
        Ok(connection.send_command(name, args).await?)
    }

    command_methods! {
        addjob, client_addjob => AddJob;
        getjob, client_getjob => GetJob;
        ackjob, client_ackjob => AckJob;
        fastack, client_fastack => FastAck;
        working, client_working => Working;
        nack, client_nack => Nack;
        deljob, client_deljob => DelJob;
        show, client_show => Show;
        jscan, client_jscan => JScan;
        qlen, client_qlen => QLen;
        qstat, client_qstat => QStat;
        qpeek, client_qpeek => QPeek;
        enqueue, client_enqueue => Enqueue;
        dequeue, client_dequeue => Dequeue;
        qscan, client_qscan => QScan;
        pause, client_pause => Pause;
        info, client_info => Info;
        hello, client_hello => Hello;
        ping, client_ping => Ping;
    }

    /// Transport events: connect failures (which also trigger a refresh)
    /// and other connection errors
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.manager.subscribe()
    }

    /// Close every pooled connection; resolves once all have closed
    pub async fn quit(&self) {
        self.manager.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::client::mock::{hello_reply, job_id, node_id, MockCluster};
    use crate::config::ServerAddress;
    use crate::utils::ClusterError;

    fn servers(list: &[(&str, u16)]) -> Vec<ServerAddress> {
        list.iter()
            .map(|(host, port)| ServerAddress::new(*host, *port))
            .collect()
    }

    /// Two-node cluster: prefix 11111111 at a:1, 22222222 at b:2
    async fn two_node_router() -> (DisqueRouter, MockCluster) {
        let cluster = MockCluster::new();
        let (one, two) = (node_id("11111111"), node_id("22222222"));
        cluster.set_membership(hello_reply(&[(&one, "a", 1), (&two, "b", 2)]));

        let router =
            DisqueRouter::with_factory(servers(&[("a", 1), ("b", 2)]), cluster.factory()).unwrap();
        router.refresh().await.unwrap();
        (router, cluster)
    }

    #[tokio::test]
    async fn test_multi_job_command_routes_by_plurality() {
        let (router, cluster) = two_node_router().await;
        let ids = vec![
            job_id("11111111", 1),
            job_id("22222222", 2),
            job_id("11111111", 3),
        ];

        let reply = router.command("ACKJOB", &ids).await.unwrap();

        assert_eq!(reply.as_str(), Some("a:1"));
        assert_eq!(
            cluster.routed(),
            vec![("a:1".to_string(), "ACKJOB".to_string())]
        );
        let sent = cluster.sent();
        assert_eq!(sent.last().unwrap().args, ids);
    }

    #[tokio::test]
    async fn test_generated_methods_route_like_call() {
        let (router, _cluster) = two_node_router().await;
        let id = vec![job_id("22222222", 7)];

        assert_eq!(router.show(&id).await.unwrap().as_str(), Some("b:2"));
        assert_eq!(
            router.call(Command::Working, &id).await.unwrap().as_str(),
            Some("b:2")
        );
        assert_eq!(
            router.select_connection("working", &id).unwrap().address(),
            "b:2"
        );
    }

    #[tokio::test]
    async fn test_client_command_bypasses_routing() {
        let (router, cluster) = two_node_router().await;
        let b = router.topology().connection("b:2").cloned().unwrap();
        let ids = vec![job_id("11111111", 1)];

        let reply = router.client_ackjob(&b, &ids).await.unwrap();

        assert_eq!(reply.as_str(), Some("b:2"));
        assert_eq!(
            cluster.routed(),
            vec![("b:2".to_string(), "ACKJOB".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unknown_command_goes_to_some_node() {
        let (router, _cluster) = two_node_router().await;
        let reply = router.command("DEBUG", &["sleep".to_string()]).await.unwrap();
        assert!(matches!(reply.as_str(), Some("a:1") | Some("b:2")));
    }

    #[tokio::test]
    async fn test_construction_starts_discovery() {
        let cluster = MockCluster::new();
        let a = node_id("aaaaaaaa");
        cluster.set_membership(hello_reply(&[(&a, "a", 1)]));

        let router = DisqueRouter::with_factory(servers(&[("a", 1)]), cluster.factory()).unwrap();
        assert!(!router.topology().is_discovered());

        let topology = router.refresh().await.unwrap();
        assert!(topology.is_discovered());
        assert_eq!(cluster.membership_queries(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_reaches_caller() {
        let cluster = MockCluster::new();
        cluster.fail_membership("a:1");

        let router = DisqueRouter::with_factory(servers(&[("a", 1)]), cluster.factory()).unwrap();
        let err = router.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            DisqueError::Cluster(ClusterError::DiscoveryExhausted { .. })
        ));

        // Seed connections still route
        let reply = router.ping(&[]).await.unwrap();
        assert_eq!(reply.as_str(), Some("a:1"));
    }

    #[tokio::test]
    async fn test_empty_server_list_is_rejected() {
        let cluster = MockCluster::new();
        let result = DisqueRouter::with_factory(Vec::<ServerAddress>::new(), cluster.factory());
        assert!(matches!(result, Err(DisqueError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_waits_for_all_connections() {
        let cluster = MockCluster::new();
        let ids = [
            node_id("11111111"),
            node_id("22222222"),
            node_id("33333333"),
        ];
        cluster.set_membership(hello_reply(&[
            (&ids[0], "a", 1),
            (&ids[1], "b", 2),
            (&ids[2], "c", 3),
        ]));
        let router = DisqueRouter::with_factory(servers(&[("a", 1)]), cluster.factory()).unwrap();
        router.refresh().await.unwrap();

        cluster.set_quit_delay("a:1", Duration::from_millis(25));
        cluster.set_quit_delay("b:2", Duration::from_millis(5));
        cluster.set_quit_delay("c:3", Duration::from_millis(15));

        router.quit().await;

        assert_eq!(cluster.closed(), vec!["b:2", "c:3", "a:1"]);
    }

    #[tokio::test]
    async fn test_commands_after_quit_fail_fast() {
        let (router, _cluster) = two_node_router().await;
        router.quit().await;

        let err = router.ping(&[]).await.unwrap_err();
        assert!(err.is_no_connection());
        assert_eq!(err.to_string(), "couldn't get client");
    }

    #[tokio::test]
    async fn test_quit_during_discovery_stays_closed() {
        let cluster = MockCluster::new();
        let (one, two) = (node_id("11111111"), node_id("22222222"));
        cluster.set_membership(hello_reply(&[(&one, "a", 1), (&two, "b", 2)]));

        let router = DisqueRouter::with_factory(servers(&[("a", 1)]), cluster.factory()).unwrap();
        // Let the startup HELLO go out, then quit before it is answered
        tokio::task::yield_now().await;
        router.quit().await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(cluster.created(), vec!["a:1"]);
        assert_eq!(cluster.closed(), vec!["a:1"]);
        assert_eq!(router.topology().num_connections(), 0);
        assert!(router.ping(&[]).await.unwrap_err().is_no_connection());
        assert!(matches!(
            router.refresh().await,
            Err(DisqueError::Cluster(ClusterError::Closed))
        ));
    }
}
