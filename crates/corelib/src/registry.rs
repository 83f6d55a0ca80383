//! Server registry.
//!
//! Owns every [`Server`]. Iteration is ordered by server name so anything
//! that walks the registry (redistribution in particular) is reproducible.

use crate::error::{Error, Result};
use crate::server::{FailureOutcome, Server, ServerState};
use std::collections::BTreeMap;

/// The set of registered servers.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: BTreeMap<String, Server>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `Available` server. Returns `false` if the name is
    /// already taken.
    pub fn register(&mut self, name: &str) -> bool {
        if self.servers.contains_key(name) {
            return false;
        }
        self.servers.insert(name.to_string(), Server::new(name));
        true
    }

    /// Remove a server, handing back its final state.
    pub fn deregister(&mut self, name: &str) -> Option<Server> {
        self.servers.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Server> {
        self.servers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// All servers, ordered by name.
    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.values()
    }

    pub fn state(&self, name: &str) -> Option<ServerState> {
        self.servers.get(name).map(Server::state)
    }

    /// Assign `id` to `name`.
    ///
    /// Fails with [`Error::ServerUnavailable`] unless the server is
    /// `Available`.
    pub fn add_client(&mut self, name: &str, id: &str) -> Result<()> {
        let server = self.server_mut(name)?;
        if server.add_client(id) {
            Ok(())
        } else {
            Err(Error::ServerUnavailable(name.to_string()))
        }
    }

    /// Remove `id` from `name`; a no-op when either is absent.
    pub fn remove_client(&mut self, name: &str, id: &str) -> bool {
        self.servers
            .get_mut(name)
            .map(|server| server.remove_client(id))
            .unwrap_or(false)
    }

    /// Remove `id` from whichever server holds it, returning that server.
    pub fn detach_client(&mut self, id: &str) -> Option<String> {
        self.servers
            .values_mut()
            .find(|server| server.has_client(id))
            .map(|server| {
                server.remove_client(id);
                server.name().to_string()
            })
    }

    /// The server currently holding `id`.
    pub fn owner_of(&self, id: &str) -> Option<&str> {
        self.servers
            .values()
            .find(|server| server.has_client(id))
            .map(Server::name)
    }

    /// Detach every client of one server.
    pub fn take_clients(&mut self, name: &str) -> Result<Vec<String>> {
        Ok(self.server_mut(name)?.take_clients())
    }

    /// Detach every client of every server.
    pub fn drain_clients(&mut self) -> Vec<String> {
        self.servers
            .values_mut()
            .flat_map(|server| server.take_clients())
            .collect()
    }

    /// Total number of assigned clients.
    pub fn client_count(&self) -> usize {
        self.servers.values().map(Server::client_count).sum()
    }

    pub fn take_offline(&mut self, name: &str) -> Result<bool> {
        Ok(self.server_mut(name)?.take_offline())
    }

    pub fn revive(&mut self, name: &str) -> Result<bool> {
        Ok(self.server_mut(name)?.revive())
    }

    pub fn mark_down(&mut self, name: &str) -> Result<Vec<String>> {
        Ok(self.server_mut(name)?.mark_down())
    }

    pub fn record_failure(&mut self, name: &str, threshold: u32) -> Result<FailureOutcome> {
        Ok(self.server_mut(name)?.record_failure(threshold))
    }

    pub fn reset_failures(&mut self, name: &str) -> Result<()> {
        self.server_mut(name)?.reset_failures();
        Ok(())
    }

    fn server_mut(&mut self, name: &str) -> Result<&mut Server> {
        self.servers
            .get_mut(name)
            .ok_or_else(|| Error::UnknownServer(name.to_string()))
    }
}
