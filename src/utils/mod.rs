//! Utility modules

pub mod error;
pub mod resp;

pub use error::{ClusterError, ConnectionError, DisqueError, ProtocolError, Result};
pub use resp::{RespDecoder, RespEncoder, RespValue};
