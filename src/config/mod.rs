//! Configuration module

pub mod cli;
pub mod router_config;

pub use cli::CliArgs;
pub use router_config::{ConnectionOptions, MembershipQuery, RouterConfig, ServerAddress};
