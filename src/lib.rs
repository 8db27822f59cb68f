//! Machine agent: runs the workers of one machine and the leadership
//! workers of the units it hosts.

pub mod agent;
pub mod cli;
pub mod config;
pub mod machiner;
pub mod network;

pub use agent::{Agent, AgentExit};
pub use cli::Cli;
pub use config::{AgentConfig, ConfigError};
