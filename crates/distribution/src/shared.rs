//! Thread-safe handle to a [`DistributionEngine`].
//!
//! Mutations serialise on the write lock. Snapshots take the read lock just
//! long enough to copy the state out, so concurrent readers always see a
//! consistent point in time.

use crate::engine::{DistributionEngine, Rebalance};
use crate::events::RingEvent;
use crate::snapshot::{ClientView, RingSnapshot, VirtualNodeView};
use crate::store::{InMemoryMappingStore, MappingStore};
use corelib::partitioner::Blake3Partitioner;
use corelib::{Partitioner, Result, ServerState};
use crossbeam::channel::Receiver;
use parking_lot::RwLock;
use std::sync::Arc;

/// Cloneable, lock-protected engine.
pub struct SharedEngine<P = Blake3Partitioner, S = InMemoryMappingStore>
where
    P: Partitioner,
    S: MappingStore,
{
    inner: Arc<RwLock<DistributionEngine<P, S>>>,
}

impl<P: Partitioner, S: MappingStore> Clone for SharedEngine<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Partitioner, S: MappingStore> From<DistributionEngine<P, S>> for SharedEngine<P, S> {
    fn from(engine: DistributionEngine<P, S>) -> Self {
        Self::new(engine)
    }
}

impl<P: Partitioner, S: MappingStore> SharedEngine<P, S> {
    pub fn new(engine: DistributionEngine<P, S>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn add_server(&self, name: &str) -> Result<Option<Rebalance>> {
        self.inner.write().add_server(name)
    }

    pub fn add_server_with_vnodes(&self, name: &str, virtual_nodes: usize) -> Result<Option<Rebalance>> {
        self.inner.write().add_server_with_vnodes(name, virtual_nodes)
    }

    pub fn remove_server(&self, name: &str) -> Option<Rebalance> {
        self.inner.write().remove_server(name)
    }

    pub fn toggle_server(&self, name: &str) -> Option<(ServerState, Rebalance)> {
        self.inner.write().toggle_server(name)
    }

    pub fn revive_server(&self, name: &str) -> Option<Rebalance> {
        self.inner.write().revive_server(name)
    }

    pub fn assign_client(&self, client: &str) -> Result<String> {
        self.inner.write().assign_client(client)
    }

    pub fn place_client_at(&self, client: &str, fraction: f64) -> Result<String> {
        self.inner.write().place_client_at(client, fraction)
    }

    pub fn remove_client(&self, client: &str) -> bool {
        self.inner.write().remove_client(client)
    }

    pub fn redistribute_all(&self) -> Rebalance {
        self.inner.write().redistribute_all()
    }

    pub fn server_for_client(&self, client: &str) -> Option<String> {
        self.inner.read().server_for_client(client).map(str::to_string)
    }

    pub fn subscribe(&self) -> Receiver<RingEvent> {
        self.inner.read().subscribe()
    }

    pub fn snapshot(&self) -> RingSnapshot {
        self.inner.read().snapshot()
    }

    pub fn list_virtual_node_positions(&self) -> Vec<VirtualNodeView> {
        self.inner.read().list_virtual_node_positions()
    }

    pub fn list_client_positions(&self) -> Vec<ClientView> {
        self.inner.read().list_client_positions()
    }

    /// Run `f` with shared access to the engine.
    pub fn read<R>(&self, f: impl FnOnce(&DistributionEngine<P, S>) -> R) -> R {
        f(&self.inner.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::events::Change;
    use std::thread;

    #[test]
    fn test_concurrent_assignments_are_serialised() {
        let engine = SharedEngine::new(DistributionEngine::new(EngineConfig::default()).unwrap());
        engine.add_server("a").unwrap();
        engine.add_server("b").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let engine = engine.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        engine.assign_client(&format!("client-{}-{}", t, i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.client_count(), 100);
        let held: usize = snapshot.servers.iter().map(|s| s.clients.len()).sum();
        assert_eq!(held, 100);
    }

    #[test]
    fn test_subscriber_sees_mutations() {
        let engine = SharedEngine::new(DistributionEngine::new(EngineConfig::default()).unwrap());
        let rx = engine.subscribe();
        engine.add_server("a").unwrap();
        engine.assign_client("c1").unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.generation, 1);
        assert_eq!(first.change, Change::ServerAdded("a".to_string()));
        let second = rx.try_recv().unwrap();
        assert_eq!(second.generation, 2);
        assert_eq!(
            second.change,
            Change::ClientAssigned {
                client: "c1".to_string(),
                server: "a".to_string()
            }
        );
        assert_eq!(engine.read(|e| e.generation()), 2);
    }
}
