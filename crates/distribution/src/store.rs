//! Client → server mapping store.
//!
//! The store is a collaborator, not the source of truth: routing decisions
//! come from the ring, and the store records the outcome so other parts of
//! a system can look a client up without consulting the ring.

use dashmap::DashMap;
use std::sync::Arc;

/// Errors returned by a [`MappingStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the write.
    #[error("mapping store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent client → server mapping.
///
/// Implementations use interior mutability so the engine can share them.
pub trait MappingStore: Send + Sync {
    /// Record that `client` is served by `server`, replacing any previous entry.
    fn save_mapping(&self, client: &str, server: &str) -> Result<(), StoreError>;

    /// The server recorded for `client`.
    fn server_for_client(&self, client: &str) -> Result<Option<String>, StoreError>;

    /// Forget `client`.
    fn remove_mapping(&self, client: &str) -> Result<(), StoreError>;

    /// Forget every client recorded against `server`.
    fn remove_server_mappings(&self, server: &str) -> Result<(), StoreError>;
}

impl<S: MappingStore + ?Sized> MappingStore for Arc<S> {
    fn save_mapping(&self, client: &str, server: &str) -> Result<(), StoreError> {
        (**self).save_mapping(client, server)
    }

    fn server_for_client(&self, client: &str) -> Result<Option<String>, StoreError> {
        (**self).server_for_client(client)
    }

    fn remove_mapping(&self, client: &str) -> Result<(), StoreError> {
        (**self).remove_mapping(client)
    }

    fn remove_server_mappings(&self, server: &str) -> Result<(), StoreError> {
        (**self).remove_server_mappings(server)
    }
}

/// In-memory [`MappingStore`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    mappings: DashMap<String, String>,
}

impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients recorded against `server`, ascending.
    pub fn clients_for_server(&self, server: &str) -> Vec<String> {
        let mut clients: Vec<String> = self
            .mappings
            .iter()
            .filter(|entry| entry.value() == server)
            .map(|entry| entry.key().clone())
            .collect();
        clients.sort();
        clients
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl MappingStore for InMemoryMappingStore {
    fn save_mapping(&self, client: &str, server: &str) -> Result<(), StoreError> {
        self.mappings.insert(client.to_string(), server.to_string());
        Ok(())
    }

    fn server_for_client(&self, client: &str) -> Result<Option<String>, StoreError> {
        Ok(self.mappings.get(client).map(|entry| entry.value().clone()))
    }

    fn remove_mapping(&self, client: &str) -> Result<(), StoreError> {
        self.mappings.remove(client);
        Ok(())
    }

    fn remove_server_mappings(&self, server: &str) -> Result<(), StoreError> {
        self.mappings.retain(|_, owner| owner.as_str() != server);
        Ok(())
    }
}
