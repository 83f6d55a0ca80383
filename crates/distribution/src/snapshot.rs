//! Read-only projections consumed by a ring visualisation.
//!
//! Positions are normalised to `[0, 1)` so a renderer can map them straight
//! onto an angle without knowing the token width.

use corelib::ServerState;
use serde::Serialize;

/// One virtual node as drawn on the ring.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VirtualNodeView {
    /// `"{server}#{replica}"`.
    pub id: String,
    pub server: String,
    pub position: f64,
    pub server_is_down: bool,
}

/// One assigned client as drawn on the ring.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClientView {
    pub id: String,
    pub position: f64,
    pub server: String,
}

/// Per-server summary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServerView {
    pub name: String,
    pub state: ServerState,
    pub failures: u32,
    pub clients: Vec<String>,
}

/// Point-in-time copy of the whole engine state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RingSnapshot {
    pub generation: u64,
    pub virtual_nodes: Vec<VirtualNodeView>,
    pub clients: Vec<ClientView>,
    pub servers: Vec<ServerView>,
}

impl RingSnapshot {
    /// The server a client is assigned to in this snapshot.
    pub fn owner_of(&self, client: &str) -> Option<&str> {
        self.clients
            .iter()
            .find(|view| view.id == client)
            .map(|view| view.server.as_str())
    }

    /// Number of assigned clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
