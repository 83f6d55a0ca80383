//! Hash ring data structure.
//!
//! # Algorithm
//!
//! Virtual nodes live in a `BTreeMap` keyed by token. The owner of a key
//! position is the owner of the smallest token `>=` that position, wrapping
//! to the smallest token overall when none is. `BTreeMap::range` makes this
//! O(log n).
//!
//! ```text
//!            0x10 (A)
//!         ┌────●────┐
//!  0x90 → │         │ ← 0x05 routes to A
//!  wraps  │         │
//!  to A   └────●────┘
//!            0x80 (B) ← 0x50 routes to B
//! ```

use crate::error::{Error, Result};
use crate::partitioner::Partitioner;
use crate::token::Token;
use crate::vnode::VirtualNode;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::trace;

/// Ordered collection of virtual nodes with circular successor lookup.
#[derive(Debug, Clone)]
pub struct HashRing<T: Token> {
    vnodes: BTreeMap<T, VirtualNode<T>>,
}

impl<T: Token> Default for HashRing<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Token> HashRing<T> {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self {
            vnodes: BTreeMap::new(),
        }
    }

    /// Build the canonical ring for `servers` (name → vnode count).
    ///
    /// Vnodes are placed in `(server, replica)` order, each at the first
    /// free salt of its placement key, so two calls with the same map give
    /// identical rings. Fails with [`Error::PositionCollision`] when a vnode
    /// finds no free position within `max_salts` salts.
    pub fn layout<P>(partitioner: &P, servers: &BTreeMap<String, u32>, max_salts: u32) -> Result<Self>
    where
        P: Partitioner<TokenType = T>,
    {
        let mut ring = Self::new();
        for (server, &count) in servers {
            for replica in 0..count {
                ring.place(partitioner, server, replica, max_salts)?;
            }
        }
        Ok(ring)
    }

    /// Insert one vnode at the first free salt of its placement key.
    fn place<P>(&mut self, partitioner: &P, server: &str, replica: u32, max_salts: u32) -> Result<()>
    where
        P: Partitioner<TokenType = T>,
    {
        let mut salt = 0;
        loop {
            match self.insert(VirtualNode::place(partitioner, server, replica, salt)) {
                Ok(()) => return Ok(()),
                Err(Error::PositionCollision(_)) if salt < max_salts => salt += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Insert a virtual node.
    ///
    /// Fails with [`Error::PositionCollision`] if a vnode already occupies
    /// that exact token; the ring is left unchanged and the caller is
    /// expected to perturb the position and retry.
    pub fn insert(&mut self, vnode: VirtualNode<T>) -> Result<()> {
        if self.vnodes.contains_key(&vnode.token) {
            return Err(Error::PositionCollision(vnode.token.to_string()));
        }
        trace!(token = %vnode.token, server = %vnode.server, "inserted vnode");
        self.vnodes.insert(vnode.token, vnode);
        Ok(())
    }

    /// Remove every virtual node owned by `server`. Returns how many were
    /// removed (0 when the server had none).
    pub fn remove_all(&mut self, server: &str) -> usize {
        let before = self.vnodes.len();
        self.vnodes.retain(|_, vnode| vnode.server != server);
        before - self.vnodes.len()
    }

    /// Remove the virtual node at `token`, if any.
    pub fn remove(&mut self, token: &T) -> Option<VirtualNode<T>> {
        self.vnodes.remove(token)
    }

    /// Owner of the first virtual node at or after `position`, wrapping to
    /// the minimum token.
    pub fn successor_of(&self, position: &T) -> Result<&str> {
        self.successor_vnode(position)
            .map(|vnode| vnode.server.as_str())
            .ok_or(Error::RingEmpty)
    }

    /// The first virtual node at or after `position` in circular order.
    pub fn successor_vnode(&self, position: &T) -> Option<&VirtualNode<T>> {
        self.vnodes
            .range(position..)
            .next()
            .or_else(|| self.vnodes.iter().next())
            .map(|(_, vnode)| vnode)
    }

    /// Walk clockwise from `position` and return the first virtual node whose
    /// server is not in `excluded`.
    ///
    /// Returns `None` when the ring is empty or every owner is excluded.
    pub fn successor_excluding(
        &self,
        position: &T,
        excluded: &HashSet<String>,
    ) -> Option<&VirtualNode<T>> {
        self.vnodes
            .range(position..)
            .chain(self.vnodes.range(..position))
            .map(|(_, vnode)| vnode)
            .find(|vnode| !excluded.contains(&vnode.server))
    }

    /// Snapshot of every virtual node, ascending by token.
    pub fn entries(&self) -> Vec<VirtualNode<T>> {
        self.vnodes.values().cloned().collect()
    }

    /// Iterate virtual nodes in ascending token order.
    pub fn iter(&self) -> impl Iterator<Item = &VirtualNode<T>> {
        self.vnodes.values()
    }

    /// Tokens owned by `server`, ascending.
    pub fn tokens_of(&self, server: &str) -> Vec<T> {
        self.vnodes
            .values()
            .filter(|vnode| vnode.server == server)
            .map(|vnode| vnode.token)
            .collect()
    }

    /// True if a vnode occupies `token`.
    pub fn contains_token(&self, token: &T) -> bool {
        self.vnodes.contains_key(token)
    }

    /// Number of virtual nodes.
    pub fn len(&self) -> usize {
        self.vnodes.len()
    }

    /// True when the ring has no virtual nodes.
    pub fn is_empty(&self) -> bool {
        self.vnodes.is_empty()
    }

    /// Vnode count per server, as [`layout`](Self::layout) takes it.
    pub fn replica_counts(&self) -> BTreeMap<String, u32> {
        let mut counts = BTreeMap::new();
        for vnode in self.vnodes.values() {
            let count = counts.entry(vnode.server.clone()).or_insert(0);
            *count = (*count).max(vnode.replica + 1);
        }
        counts
    }

    /// True if any vnode sits on a salted position.
    pub fn has_salted(&self) -> bool {
        self.vnodes.values().any(|vnode| vnode.salt > 0)
    }

    /// Number of distinct servers with at least one vnode.
    pub fn server_count(&self) -> usize {
        self.vnodes
            .values()
            .map(|vnode| vnode.server.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token32;

    /// Two-server ring from the 8-bit example, scaled into the 32-bit space.
    fn example_ring() -> HashRing<Token32> {
        let mut ring = HashRing::new();
        ring.insert(VirtualNode::new(Token32(0x10 << 24), "A", 0)).unwrap();
        ring.insert(VirtualNode::new(Token32(0x80 << 24), "B", 0)).unwrap();
        ring
    }

    #[test]
    fn test_successor_examples() {
        let ring = example_ring();
        assert_eq!(ring.successor_of(&Token32(0x05 << 24)).unwrap(), "A");
        assert_eq!(ring.successor_of(&Token32(0x50 << 24)).unwrap(), "B");
        assert_eq!(ring.successor_of(&Token32(0x90 << 24)).unwrap(), "A");
    }

    #[test]
    fn test_successor_is_inclusive() {
        let ring = example_ring();
        assert_eq!(ring.successor_of(&Token32(0x10 << 24)).unwrap(), "A");
        assert_eq!(ring.successor_of(&Token32(0x80 << 24)).unwrap(), "B");
        assert_eq!(ring.successor_of(&Token32::MAX).unwrap(), "A");
    }

    #[test]
    fn test_empty_ring() {
        let ring: HashRing<Token32> = HashRing::new();
        assert_eq!(ring.successor_of(&Token32(1)), Err(Error::RingEmpty));
        assert!(ring.successor_excluding(&Token32(1), &HashSet::new()).is_none());
    }

    #[test]
    fn test_collision_rejected() {
        let mut ring = example_ring();
        let err = ring.insert(VirtualNode::new(Token32(0x10 << 24), "C", 0));
        assert!(matches!(err, Err(Error::PositionCollision(_))));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.successor_of(&Token32(0)).unwrap(), "A");
    }

    #[test]
    fn test_successor_excluding_walks_past_tried() {
        let ring = example_ring();
        let mut tried = HashSet::new();
        tried.insert("A".to_string());
        let next = ring.successor_excluding(&Token32(0x05 << 24), &tried).unwrap();
        assert_eq!(next.server, "B");

        tried.insert("B".to_string());
        assert!(ring.successor_excluding(&Token32(0x05 << 24), &tried).is_none());
    }

    #[test]
    fn test_remove_all() {
        let mut ring = example_ring();
        ring.insert(VirtualNode::new(Token32(0xc0 << 24), "A", 1)).unwrap();
        assert_eq!(ring.server_count(), 2);
        assert_eq!(ring.remove_all("A"), 2);
        assert_eq!(ring.remove_all("A"), 0);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.successor_of(&Token32(0)).unwrap(), "B");
    }

    #[test]
    fn test_entries_sorted() {
        let mut ring = HashRing::new();
        for (i, t) in [9u32, 3, 7, 1].into_iter().enumerate() {
            ring.insert(VirtualNode::new(Token32(t), "s", i as u32)).unwrap();
        }
        let tokens: Vec<u32> = ring.entries().iter().map(|v| v.token.0).collect();
        assert_eq!(tokens, vec![1, 3, 7, 9]);
        assert_eq!(ring.tokens_of("s").len(), 4);
    }

    /// Sends `A#0` and `B#0` to the same position; salted keys go elsewhere.
    struct Colliding;

    impl Partitioner for Colliding {
        type TokenType = Token32;

        fn partition(&self, key: &[u8]) -> Token32 {
            match key {
                b"A#0" | b"B#0" => Token32(0x10 << 24),
                b"A#0/1" => Token32(0x30 << 24),
                b"B#0/1" => Token32(0x80 << 24),
                _ => Token32(0xf0 << 24),
            }
        }

        fn name(&self) -> &'static str {
            "Colliding"
        }
    }

    #[test]
    fn test_layout_settles_collisions_by_key_order() {
        let mut servers = BTreeMap::new();
        servers.insert("B".to_string(), 1);
        servers.insert("A".to_string(), 1);

        let ring = HashRing::layout(&Colliding, &servers, 4).unwrap();
        assert_eq!(ring.tokens_of("A"), vec![Token32(0x10 << 24)]);
        assert_eq!(ring.tokens_of("B"), vec![Token32(0x80 << 24)]);
        assert!(ring.has_salted());
        assert_eq!(ring.replica_counts(), servers);

        servers.remove("A");
        let ring = HashRing::layout(&Colliding, &servers, 4).unwrap();
        assert_eq!(ring.tokens_of("B"), vec![Token32(0x10 << 24)]);
        assert!(!ring.has_salted());
    }

    #[test]
    fn test_layout_gives_up_after_max_salts() {
        let mut servers = BTreeMap::new();
        servers.insert("A".to_string(), 1);
        servers.insert("B".to_string(), 1);
        assert!(matches!(
            HashRing::layout(&Colliding, &servers, 0),
            Err(Error::PositionCollision(_))
        ));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: the successor is the smallest token >= the key, or
            /// the smallest token overall when none is.
            #[test]
            fn prop_successor_matches_definition(
                tokens in prop::collection::btree_set(any::<u32>(), 1..40),
                key in any::<u32>(),
            ) {
                let mut ring = HashRing::new();
                for (i, t) in tokens.iter().enumerate() {
                    ring.insert(VirtualNode::new(Token32(*t), format!("s{}", i % 5), i as u32)).unwrap();
                }

                let expected = tokens
                    .iter()
                    .find(|t| **t >= key)
                    .or_else(|| tokens.iter().next())
                    .unwrap();
                let vnode = ring.successor_vnode(&Token32(key)).unwrap();
                prop_assert_eq!(vnode.token, Token32(*expected));
            }
        }
    }
}
