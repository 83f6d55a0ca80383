//! Distribution engine.
//!
//! Keeps the ring, the server registry and the mapping store consistent
//! while servers join, leave, drain and fail.
//!
//! # Assignment algorithm
//!
//! 1. Hash the client id to a token (or take an explicit position).
//! 2. Walk clockwise from the token to the first vnode whose server has not
//!    been tried yet in this chain.
//! 3. If that server is `Available`, it takes the client, the mapping is
//!    persisted and the server's failure counter resets. Done.
//! 4. Otherwise the server's failure counter goes up (possibly sending it
//!    `Down`) and the walk continues from step 2.
//!
//! The chain makes at most one attempt per registered server, so it always
//! terminates, even when every server is unavailable.
//!
//! # Redistribution
//!
//! Adding or reviving a server changes which server a client's token
//! resolves to. Redistribution detaches every assigned client and replays
//! the assignment algorithm in `(token, client id)` order. Because the
//! successor walk is a pure function of ring state and token, running it
//! twice in a row yields the same mapping.

use crate::config::EngineConfig;
use crate::events::{Change, EventHub, RingEvent};
use crate::snapshot::{ClientView, RingSnapshot, ServerView, VirtualNodeView};
use crate::store::{InMemoryMappingStore, MappingStore};
use corelib::partitioner::Blake3Partitioner;
use corelib::{
    Error, FailureOutcome, HashRing, Partitioner, Result, Server, ServerRegistry, ServerState,
    Token, VirtualNode,
};
use crossbeam::channel::Receiver;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Salts tried per vnode before placement gives up.
const MAX_PLACEMENT_SALTS: u32 = 32;

/// What a mutation did to client assignments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rebalance {
    /// Client → server for every client placed by the operation.
    pub placed: BTreeMap<String, String>,
    /// Placed clients that ended up on a different server than before.
    pub moved: usize,
    /// Clients nobody accepted. They are forgotten.
    pub dropped: Vec<String>,
    /// Mapping store writes that failed. The in-memory assignment stands.
    pub store_errors: usize,
}

impl Rebalance {
    fn merge(&mut self, other: Rebalance) {
        self.placed.extend(other.placed);
        self.moved += other.moved;
        self.dropped.extend(other.dropped);
        self.store_errors += other.store_errors;
    }
}

/// A client waiting to be (re)placed, with the server that held it before.
type Pending = (String, Option<String>);

/// Owns the ring and registry and routes clients across them.
///
/// All mutating operations take `&mut self`; wrap the engine in
/// [`SharedEngine`](crate::SharedEngine) to use it from several threads.
pub struct DistributionEngine<P = Blake3Partitioner, S = InMemoryMappingStore>
where
    P: Partitioner,
    S: MappingStore,
{
    config: EngineConfig,
    partitioner: P,
    store: S,
    ring: HashRing<P::TokenType>,
    registry: ServerRegistry,
    /// Ring position of every tracked client.
    positions: BTreeMap<String, P::TokenType>,
    /// Failed store writes since construction.
    store_errors: u64,
    generation: u64,
    events: EventHub,
}

impl DistributionEngine {
    /// Engine on the 160-bit BLAKE3 ring with an in-memory store.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_parts(config, Blake3Partitioner, InMemoryMappingStore::new())
    }
}

impl<P, S> DistributionEngine<P, S>
where
    P: Partitioner,
    S: MappingStore,
{
    /// Engine with an explicit hash function and mapping store.
    pub fn with_parts(config: EngineConfig, partitioner: P, store: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            partitioner,
            store,
            ring: HashRing::new(),
            registry: ServerRegistry::new(),
            positions: BTreeMap::new(),
            store_errors: 0,
            generation: 0,
            events: EventHub::new(),
        })
    }

    // ----- Membership -----

    /// Add a server with the configured number of virtual nodes.
    ///
    /// Returns `Ok(None)` if the name is already registered.
    pub fn add_server(&mut self, name: &str) -> Result<Option<Rebalance>> {
        self.add_server_with_vnodes(name, self.config.virtual_nodes)
    }

    /// Add a server with an explicit virtual node count, then redistribute.
    pub fn add_server_with_vnodes(
        &mut self,
        name: &str,
        virtual_nodes: usize,
    ) -> Result<Option<Rebalance>> {
        if virtual_nodes == 0 {
            return Err(Error::InvalidConfig(
                "virtual node count must be positive".to_string(),
            ));
        }
        if self.registry.contains(name) {
            debug!(server = %name, "server already registered");
            return Ok(None);
        }

        self.place_vnodes(name, virtual_nodes)?;
        self.registry.register(name);
        metrics::gauge!("hashring_servers").set(self.registry.len() as f64);
        info!(server = %name, virtual_nodes, "added server");

        let errors = self.store_errors;
        let mut report = self.redistribute();
        report.store_errors = self.store_errors_since(errors);
        self.publish(Change::ServerAdded(name.to_string()));
        Ok(Some(report))
    }

    /// Remove a server and re-home every client it held.
    ///
    /// Returns `None` if the server is not registered.
    pub fn remove_server(&mut self, name: &str) -> Option<Rebalance> {
        let clients = self.registry.take_clients(name).ok()?;
        let errors = self.store_errors;
        let removed = self.ring.remove_all(name);
        self.registry.deregister(name);
        if let Err(e) = self.store.remove_server_mappings(name) {
            warn!(server = %name, error = %e, "failed to clear server mappings");
            self.count_store_error();
        }
        metrics::gauge!("hashring_servers").set(self.registry.len() as f64);
        info!(server = %name, vnodes = removed, clients = clients.len(), "removed server");

        let mut pending: Vec<Pending> = clients
            .into_iter()
            .map(|c| (c, Some(name.to_string())))
            .collect();
        if self.ring.has_salted() {
            // Salted vnodes may now have their plain position back, which
            // can change owners anywhere on the ring.
            self.relayout();
            pending.extend(self.detach_all());
        }
        let pending = self.ordered(pending);
        let mut report = self.reassign(pending, None);
        report.store_errors = self.store_errors_since(errors);
        self.publish(Change::ServerRemoved(name.to_string()));
        Some(report)
    }

    /// Flip a server between `Available` and `TemporarilyOffline`.
    ///
    /// Draining moves the server's clients to their next available
    /// successors; the drained server keeps its vnodes. Toggling an offline
    /// or `Down` server revives it and redistributes. Returns the new state,
    /// or `None` if the server is not registered.
    pub fn toggle_server(&mut self, name: &str) -> Option<(ServerState, Rebalance)> {
        let state = self.registry.state(name)?;
        if !state.is_available() {
            let report = self.revive_server(name)?;
            return Some((ServerState::Available, report));
        }

        self.registry.take_offline(name).ok()?;
        let clients = self.registry.take_clients(name).ok()?;
        info!(server = %name, clients = clients.len(), "server taken offline");

        let errors = self.store_errors;
        let pending = self.ordered(clients.into_iter().map(|c| (c, Some(name.to_string()))));
        let mut report = self.reassign(pending, Some(name));
        report.store_errors = self.store_errors_since(errors);
        self.publish(Change::ServerStateChanged {
            server: name.to_string(),
            state: ServerState::TemporarilyOffline,
        });
        Some((ServerState::TemporarilyOffline, report))
    }

    /// Bring an offline or `Down` server back to `Available` with a zero
    /// failure counter, then redistribute so its clients migrate back.
    ///
    /// A no-op on an `Available` server. Returns `None` if the server is
    /// not registered.
    pub fn revive_server(&mut self, name: &str) -> Option<Rebalance> {
        if !self.registry.revive(name).ok()? {
            return Some(Rebalance::default());
        }
        info!(server = %name, "server revived");
        let errors = self.store_errors;
        let mut report = self.redistribute();
        report.store_errors = self.store_errors_since(errors);
        self.publish(Change::ServerStateChanged {
            server: name.to_string(),
            state: ServerState::Available,
        });
        Some(report)
    }

    // ----- Clients -----

    /// Route a client by the hash of its id and record the assignment.
    ///
    /// Fails with [`Error::RingEmpty`] when no server is registered and
    /// [`Error::AllServersExhausted`] when no server accepted it. Either way
    /// the client is dropped and the engine stays usable.
    pub fn assign_client(&mut self, client: &str) -> Result<String> {
        let token = self.partitioner.partition(client.as_bytes());
        self.assign_at(client, token)
    }

    /// Like [`assign_client`](Self::assign_client) but at an explicit ring
    /// position in `[0, 1)`, bypassing the hash.
    pub fn place_client_at(&mut self, client: &str, fraction: f64) -> Result<String> {
        let token = <P::TokenType as Token>::from_fraction(fraction)
            .ok_or_else(|| Error::InvalidPosition(fraction.to_string()))?;
        self.assign_at(client, token)
    }

    /// Stop tracking a client. Returns whether it was known.
    pub fn remove_client(&mut self, client: &str) -> bool {
        let tracked = self.positions.remove(client).is_some();
        let owner = self.registry.detach_client(client);
        if !tracked && owner.is_none() {
            return false;
        }
        if let Err(e) = self.store.remove_mapping(client) {
            warn!(%client, error = %e, "failed to remove mapping");
            self.count_store_error();
        }
        debug!(%client, server = ?owner, "removed client");
        self.publish(Change::ClientRemoved(client.to_string()));
        true
    }

    /// Detach every client and replay assignment against the current ring.
    pub fn redistribute_all(&mut self) -> Rebalance {
        let errors = self.store_errors;
        let mut report = self.redistribute();
        report.store_errors = self.store_errors_since(errors);
        self.publish(Change::Redistributed);
        report
    }

    // ----- Queries -----

    /// The server holding `client`.
    pub fn server_for_client(&self, client: &str) -> Option<&str> {
        self.registry.owner_of(client)
    }

    /// Ring position of a tracked client.
    pub fn position_of(&self, client: &str) -> Option<P::TokenType> {
        self.positions.get(client).copied()
    }

    pub fn server_state(&self, name: &str) -> Option<ServerState> {
        self.registry.state(name)
    }

    pub fn failure_count(&self, name: &str) -> Option<u32> {
        self.registry.get(name).map(Server::failures)
    }

    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.registry.servers()
    }

    pub fn ring(&self) -> &HashRing<P::TokenType> {
        &self.ring
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn partitioner(&self) -> &P {
        &self.partitioner
    }

    /// Mapping store writes that have failed since the engine was built.
    pub fn store_errors(&self) -> u64 {
        self.store_errors
    }

    /// Number of mutations published so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Receive a [`RingEvent`] after every mutation.
    pub fn subscribe(&self) -> Receiver<RingEvent> {
        self.events.subscribe()
    }

    /// Every virtual node, ascending by position.
    pub fn list_virtual_node_positions(&self) -> Vec<VirtualNodeView> {
        self.ring
            .iter()
            .map(|vnode| {
                let state = self.registry.state(&vnode.server);
                VirtualNodeView {
                    id: vnode.label(),
                    server: vnode.server.clone(),
                    position: vnode.token.fraction(),
                    server_is_down: state == Some(ServerState::Down),
                }
            })
            .collect()
    }

    /// Every assigned client, ascending by position.
    pub fn list_client_positions(&self) -> Vec<ClientView> {
        let mut clients: Vec<(P::TokenType, ClientView)> = self
            .registry
            .servers()
            .flat_map(|server| {
                server.clients().map(move |id| {
                    let token = self.token_for(id);
                    let view = ClientView {
                        id: id.to_string(),
                        position: token.fraction(),
                        server: server.name().to_string(),
                    };
                    (token, view)
                })
            })
            .collect();
        clients.sort_by(|(a, va), (b, vb)| a.cmp(b).then_with(|| va.id.cmp(&vb.id)));
        clients.into_iter().map(|(_, view)| view).collect()
    }

    /// Point-in-time copy of ring, clients and servers.
    pub fn snapshot(&self) -> RingSnapshot {
        RingSnapshot {
            generation: self.generation,
            virtual_nodes: self.list_virtual_node_positions(),
            clients: self.list_client_positions(),
            servers: self
                .registry
                .servers()
                .map(|server| ServerView {
                    name: server.name().to_string(),
                    state: server.state(),
                    failures: server.failures(),
                    clients: server.clients().map(str::to_string).collect(),
                })
                .collect(),
        }
    }

    // ----- Internals -----

    /// Insert `count` vnodes for `name`.
    ///
    /// When every plain position is free they go straight in. Otherwise the
    /// whole ring is rebuilt with [`HashRing::layout`] so collisions settle
    /// the same way whatever order servers joined in. The ring is left
    /// unchanged on failure.
    fn place_vnodes(&mut self, name: &str, count: usize) -> Result<()> {
        let count = u32::try_from(count)
            .map_err(|_| Error::InvalidConfig(format!("too many virtual nodes: {}", count)))?;
        let vnodes: Vec<VirtualNode<P::TokenType>> = (0..count)
            .map(|replica| VirtualNode::place(&self.partitioner, name, replica, 0))
            .collect();

        let mut seen = HashSet::new();
        let clear = vnodes
            .iter()
            .all(|vnode| !self.ring.contains_token(&vnode.token) && seen.insert(vnode.token));
        if clear {
            for vnode in vnodes {
                self.ring.insert(vnode)?;
            }
            return Ok(());
        }

        let mut servers = self.ring.replica_counts();
        servers.insert(name.to_string(), count);
        debug!(server = %name, "vnode collision, rebuilding ring layout");
        self.ring = HashRing::layout(&self.partitioner, &servers, MAX_PLACEMENT_SALTS)?;
        Ok(())
    }

    /// Rebuild the ring from its current membership.
    fn relayout(&mut self) {
        let servers = self.ring.replica_counts();
        match HashRing::layout(&self.partitioner, &servers, MAX_PLACEMENT_SALTS) {
            Ok(ring) => self.ring = ring,
            Err(e) => warn!(error = %e, "could not rebuild ring layout, keeping current positions"),
        }
    }

    fn assign_at(&mut self, client: &str, token: P::TokenType) -> Result<String> {
        let previous = self.registry.detach_client(client);
        self.positions.insert(client.to_string(), token);

        let mut evicted = Vec::new();
        let result = self.place(client, token, None, &mut evicted);
        let mut report = Rebalance::default();
        self.settle(client, previous, &result, &mut report);
        if !evicted.is_empty() {
            let pending = self.ordered(evicted);
            report.merge(self.reassign(pending, None));
        }

        let change = match &result {
            Ok(server) => Change::ClientAssigned {
                client: client.to_string(),
                server: server.clone(),
            },
            Err(_) => Change::ClientDropped(client.to_string()),
        };
        self.publish(change);
        result
    }

    /// One assignment chain. Clients evicted by a server going `Down` along
    /// the way are appended to `evicted`.
    fn place(
        &mut self,
        client: &str,
        token: P::TokenType,
        excluded: Option<&str>,
        evicted: &mut Vec<Pending>,
    ) -> Result<String> {
        if self.registry.is_empty() {
            return Err(Error::RingEmpty);
        }

        let mut tried: HashSet<String> = excluded.into_iter().map(str::to_string).collect();
        for _ in 0..self.registry.len() {
            let server = match self.ring.successor_excluding(&token, &tried) {
                Some(vnode) => vnode.server.clone(),
                None => break,
            };
            tried.insert(server.clone());

            match self.registry.add_client(&server, client) {
                Ok(()) => {
                    self.registry.reset_failures(&server)?;
                    self.persist(client, &server);
                    metrics::counter!("hashring_assignments_total").increment(1);
                    debug!(%client, %token, %server, "assigned client");
                    return Ok(server);
                }
                Err(Error::ServerUnavailable(_)) => {
                    metrics::counter!("hashring_assignment_failures_total").increment(1);
                    match self.registry.record_failure(&server, self.config.failure_threshold)? {
                        FailureOutcome::Counted(failures) => {
                            debug!(%client, %server, failures, "server unavailable, trying next");
                        }
                        // Offline servers are drained on entry, so this is
                        // normally empty.
                        FailureOutcome::WentDown(clients) => {
                            warn!(
                                %server,
                                threshold = self.config.failure_threshold,
                                evicted = clients.len(),
                                "server reached failure threshold, marked down"
                            );
                            evicted.extend(clients.into_iter().map(|c| (c, Some(server.clone()))));
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::AllServersExhausted(client.to_string()))
    }

    /// Place every pending client in order, including any evicted on the way.
    fn reassign(&mut self, pending: Vec<Pending>, excluded: Option<&str>) -> Rebalance {
        let mut report = Rebalance::default();
        let mut queue: VecDeque<Pending> = pending.into();
        while let Some((client, previous)) = queue.pop_front() {
            let token = self.token_for(&client);
            let mut evicted = Vec::new();
            let result = self.place(&client, token, excluded, &mut evicted);
            self.settle(&client, previous, &result, &mut report);
            queue.extend(evicted);
        }
        report
    }

    /// Detach every assigned client, remembering its owner.
    fn detach_all(&mut self) -> Vec<Pending> {
        let assigned: Vec<Pending> = self
            .registry
            .servers()
            .flat_map(|server| {
                server
                    .clients()
                    .map(move |c| (c.to_string(), Some(server.name().to_string())))
            })
            .collect();
        self.registry.drain_clients();
        assigned
    }

    fn redistribute(&mut self) -> Rebalance {
        let assigned = self.detach_all();
        let pending = self.ordered(assigned);
        let report = self.reassign(pending, None);
        debug!(
            placed = report.placed.len(),
            moved = report.moved,
            dropped = report.dropped.len(),
            "redistributed clients"
        );
        report
    }

    /// Record the outcome of one chain in `report`.
    fn settle(
        &mut self,
        client: &str,
        previous: Option<String>,
        result: &Result<String>,
        report: &mut Rebalance,
    ) {
        match result {
            Ok(server) => {
                if previous.as_deref().is_some_and(|p| p != server) {
                    report.moved += 1;
                }
                report.placed.insert(client.to_string(), server.clone());
            }
            Err(e) => {
                warn!(%client, error = %e, "client dropped");
                metrics::counter!("hashring_clients_dropped_total").increment(1);
                self.positions.remove(client);
                if let Err(e) = self.store.remove_mapping(client) {
                    warn!(%client, error = %e, "failed to remove stale mapping");
                    self.count_store_error();
                }
                report.dropped.push(client.to_string());
            }
        }
    }

    fn persist(&mut self, client: &str, server: &str) {
        if let Err(e) = self.store.save_mapping(client, server) {
            warn!(%client, %server, error = %e, "failed to persist mapping");
            self.count_store_error();
        }
    }

    fn count_store_error(&mut self) {
        self.store_errors += 1;
        metrics::counter!("hashring_store_errors_total").increment(1);
    }

    fn store_errors_since(&self, before: u64) -> usize {
        (self.store_errors - before) as usize
    }

    fn token_for(&self, client: &str) -> P::TokenType {
        self.positions
            .get(client)
            .copied()
            .unwrap_or_else(|| self.partitioner.partition(client.as_bytes()))
    }

    /// Sort pending clients by `(token, id)`.
    fn ordered(&self, clients: impl IntoIterator<Item = Pending>) -> Vec<Pending> {
        let mut keyed: Vec<(P::TokenType, Pending)> = clients
            .into_iter()
            .map(|pending| (self.token_for(&pending.0), pending))
            .collect();
        keyed.sort_by(|(a, pa), (b, pb)| a.cmp(b).then_with(|| pa.0.cmp(&pb.0)));
        keyed.into_iter().map(|(_, pending)| pending).collect()
    }

    fn publish(&mut self, change: Change) {
        self.generation += 1;
        self.events.publish(RingEvent {
            generation: self.generation,
            change,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::partitioner::Xxh3Partitioner;

    #[test]
    fn test_clients_evicted_by_down_transition_are_rehomed() {
        let config = EngineConfig::default()
            .with_virtual_nodes(1)
            .with_failure_threshold(1);
        let mut engine =
            DistributionEngine::with_parts(config, Xxh3Partitioner, InMemoryMappingStore::new())
                .unwrap();
        engine.add_server("a").unwrap();
        engine.add_server("b").unwrap();

        // An offline server that still holds a client.
        engine.registry.add_client("a", "stale").unwrap();
        engine.registry.take_offline("a").unwrap();

        let at_a = engine.ring().tokens_of("a")[0].fraction();
        assert_eq!(engine.place_client_at("x", at_a).unwrap(), "b");

        assert_eq!(engine.server_state("a"), Some(ServerState::Down));
        assert_eq!(engine.server_for_client("stale"), Some("b"));
        assert_eq!(
            engine.store().server_for_client("stale").unwrap(),
            Some("b".to_string())
        );
        assert_eq!(engine.registry().client_count(), 2);
    }
}
