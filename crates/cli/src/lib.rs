//! CLI tool for driving a consistent-hash client distributor.
//!
//! Provides commands for:
//! - Replaying scripted membership and client operations
//! - Simulating load across a set of servers

pub mod commands;
pub mod config;
pub mod logging;
pub mod script;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
pub use script::{Applied, ScriptOp};
