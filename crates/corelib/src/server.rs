//! Server abstractions and the availability state machine.
//!
//! ```text
//!               toggle                    failures >= threshold
//!  Available ───────────► TemporarilyOffline ──────────────────► Down
//!      ▲  ◄─────────────────────┘                                  │
//!      │      toggle / revive (failures reset)                      │
//!      └─────────────────────────────────────────────────────────────┘
//!                           revive (failures reset)
//! ```
//!
//! Every transition is idempotent: applying it from its target state is a
//! no-op.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Availability of a server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerState {
    /// Accepting clients.
    Available,
    /// Drained by an operator. Keeps its ring positions, accepts nothing.
    TemporarilyOffline,
    /// Failed too often. Its clients have been evicted.
    Down,
}

impl ServerState {
    /// True only for [`ServerState::Available`].
    pub fn is_available(&self) -> bool {
        matches!(self, ServerState::Available)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::Available => "available",
            ServerState::TemporarilyOffline => "offline",
            ServerState::Down => "down",
        };
        f.write_str(s)
    }
}

/// Result of recording one failed assignment attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Counter incremented; threshold not reached (or already Down).
    Counted(u32),
    /// This failure reached the threshold and the server went Down.
    /// Carries the clients evicted by the transition.
    WentDown(Vec<String>),
}

/// A backend server that clients are assigned to.
#[derive(Clone, Debug)]
pub struct Server {
    name: String,
    state: ServerState,
    clients: BTreeSet<String>,
    failures: u32,
}

impl Server {
    /// New server in the `Available` state with no clients.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ServerState::Available,
            clients: BTreeSet::new(),
            failures: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state.is_available()
    }

    pub fn is_down(&self) -> bool {
        self.state == ServerState::Down
    }

    /// Consecutive failed assignment attempts since the last success/revive.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Assigned client ids, ascending.
    pub fn clients(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(String::as_str)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn has_client(&self, id: &str) -> bool {
        self.clients.contains(id)
    }

    /// Accept a client. Only an `Available` server accepts.
    pub fn add_client(&mut self, id: impl Into<String>) -> bool {
        if !self.is_available() {
            return false;
        }
        self.clients.insert(id.into());
        true
    }

    /// Remove a client; returns whether it was present.
    pub fn remove_client(&mut self, id: &str) -> bool {
        self.clients.remove(id)
    }

    /// Detach and return every client.
    pub fn take_clients(&mut self) -> Vec<String> {
        std::mem::take(&mut self.clients).into_iter().collect()
    }

    /// Available → TemporarilyOffline. Returns whether the state changed.
    pub fn take_offline(&mut self) -> bool {
        if self.state != ServerState::Available {
            return false;
        }
        self.state = ServerState::TemporarilyOffline;
        true
    }

    /// TemporarilyOffline | Down → Available, resetting the failure counter.
    /// Returns whether the state changed.
    pub fn revive(&mut self) -> bool {
        if self.state == ServerState::Available {
            return false;
        }
        self.state = ServerState::Available;
        self.failures = 0;
        true
    }

    /// Any state → Down, clearing the client set. Returns the evicted
    /// clients (empty if already Down).
    pub fn mark_down(&mut self) -> Vec<String> {
        if self.state == ServerState::Down {
            return Vec::new();
        }
        self.state = ServerState::Down;
        self.take_clients()
    }

    /// Count a failed assignment attempt and go Down once `threshold` is
    /// reached.
    pub fn record_failure(&mut self, threshold: u32) -> FailureOutcome {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= threshold && self.state != ServerState::Down {
            FailureOutcome::WentDown(self.mark_down())
        } else {
            FailureOutcome::Counted(self.failures)
        }
    }

    pub fn reset_failures(&mut self) {
        self.failures = 0;
    }
}
