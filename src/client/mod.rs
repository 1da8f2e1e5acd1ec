//! Client connection layer

pub mod connection;
pub mod pool;
pub mod raw_connection;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::{
    Connection, ConnectionEvents, ConnectionFactory, NodeConnection, PooledConnection,
    TransportReport,
};
pub use pool::{ClusterEvent, ConnectionPool};
pub use raw_connection::{RawConnection, RawConnectionFactory};
