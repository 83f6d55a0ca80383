//! Client distribution over a consistent hash ring.
//!
//! This crate ties the ring and server registry from `corelib` together:
//! - [`DistributionEngine`]: membership, assignment, failure escalation
//! - [`MappingStore`]: where successful assignments are recorded
//! - Read-only snapshots and change events for a ring visualisation
//! - [`SharedEngine`]: the engine behind a single read/write lock

pub mod config;
pub mod engine;
pub mod events;
pub mod shared;
pub mod snapshot;
pub mod store;

pub use config::EngineConfig;
pub use engine::{DistributionEngine, Rebalance};
pub use events::{Change, EventHub, RingEvent};
pub use shared::SharedEngine;
pub use snapshot::{ClientView, RingSnapshot, ServerView, VirtualNodeView};
pub use store::{InMemoryMappingStore, MappingStore, StoreError};
