//! Core library for consistent-hash client distribution.
//!
//! This crate provides the fundamental abstractions:
//! - Token types and partitioners (the hash function)
//! - Virtual nodes and the hash ring with circular successor lookup
//! - Servers, their availability state machine, and the registry that owns them

pub mod error;
pub mod partitioner;
pub mod registry;
pub mod ring;
pub mod server;
pub mod token;
pub mod vnode;

pub use error::{Error, Result};
pub use partitioner::Partitioner;
pub use registry::ServerRegistry;
pub use ring::HashRing;
pub use server::{FailureOutcome, Server, ServerState};
pub use token::Token;
pub use vnode::VirtualNode;
