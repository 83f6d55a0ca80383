//! Change notification.
//!
//! Each mutating engine operation publishes one [`RingEvent`]. Callers that
//! render the ring subscribe and pull a fresh snapshot when an event arrives,
//! so the engine never calls back into a UI.

use corelib::ServerState;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// Events a subscriber may fall behind by before new ones are discarded.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// What a mutation changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Change {
    ServerAdded(String),
    ServerRemoved(String),
    ServerStateChanged { server: String, state: ServerState },
    ClientAssigned { client: String, server: String },
    ClientDropped(String),
    ClientRemoved(String),
    Redistributed,
}

/// Published after every mutation. `generation` increases by one each time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RingEvent {
    pub generation: u64,
    pub change: Change,
}

/// Fan-out to any number of subscribers.
///
/// Each subscriber gets a bounded queue. A subscriber whose queue is full
/// misses events until it catches up; the generation counter lets it notice
/// the gap.
#[derive(Debug)]
pub struct EventHub {
    subscribers: Mutex<Vec<Sender<RingEvent>>>,
    capacity: usize,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Receiver<RingEvent> {
        let (tx, rx) = channel::bounded(self.capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber without blocking, pruning
    /// disconnected ones.
    pub fn publish(&self, event: RingEvent) {
        self.subscribers
            .lock()
            .retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(event)) => {
                    debug!(generation = event.generation, "subscriber lagging, event discarded");
                    metrics::counter!("hashring_events_discarded_total").increment(1);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
