//! Virtual node abstractions.
//!
//! # Virtual Nodes (VNodes) Concept
//!
//! Instead of each server having a single token on the ring, each server owns
//! several tokens (virtual nodes). This provides:
//!
//! 1. **Better Load Distribution**: More tokens = smoother distribution of clients
//! 2. **Gradual Rebalancing**: When servers join/leave, only a fraction of clients move
//! 3. **Fault Tolerance**: A failed server's clients spread over several successors
//!
//! # Placement
//!
//! Tokens are derived from the placement key `"{server}#{replica}"`, so the
//! same server name and replica index always land on the same position. When
//! that position is already taken, a salt is appended
//! (`"{server}#{replica}/{salt}"`) and the key is rehashed. Collisions are
//! settled in `(server, replica)` order (see [`HashRing::layout`]), so the
//! layout depends only on the set of servers, not on when they joined.
//!
//! [`HashRing::layout`]: crate::ring::HashRing::layout
//!
//! # Typical Configuration
//!
//! - **Visualisation**: 2-8 vnodes/server
//! - **Production fidelity**: 100+ vnodes/server

use crate::partitioner::Partitioner;
use crate::token::Token;
use std::fmt;

/// A virtual node on the hash ring.
///
/// Represents a single token position owned by a server.
///
/// # Invariants
///
/// - Every `VirtualNode` in a ring has a unique token
/// - Every `VirtualNode` belongs to exactly one server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualNode<T: Token> {
    /// Token position on the ring.
    pub token: T,

    /// The server that owns this virtual node.
    ///
    /// Multiple virtual nodes share the same server; a lookup lands on a
    /// vnode and is routed to this name.
    pub server: String,

    /// Index of this vnode among its server's vnodes (0, 1, 2, ...).
    pub replica: u32,

    /// Collision salt mixed into the placement key; 0 for the plain key.
    pub salt: u32,
}

impl<T: Token> VirtualNode<T> {
    /// Create a virtual node at an explicit token.
    #[inline]
    pub fn new(token: T, server: impl Into<String>, replica: u32) -> Self {
        Self {
            token,
            server: server.into(),
            replica,
            salt: 0,
        }
    }

    /// Create a virtual node by hashing its placement key.
    ///
    /// `salt` 0 hashes `"{server}#{replica}"`; any other salt hashes
    /// `"{server}#{replica}/{salt}"`. The result depends only on its inputs.
    ///
    /// # Example
    /// ```rust
    /// use corelib::partitioner::Blake3Partitioner;
    /// use corelib::VirtualNode;
    ///
    /// let vnode0 = VirtualNode::place(&Blake3Partitioner, "cache-a", 0, 0);
    /// let vnode1 = VirtualNode::place(&Blake3Partitioner, "cache-a", 1, 0);
    /// assert_ne!(vnode0.token, vnode1.token);
    /// ```
    pub fn place<P>(partitioner: &P, server: &str, replica: u32, salt: u32) -> Self
    where
        P: Partitioner<TokenType = T>,
    {
        let key = placement_key(server, replica, salt);
        Self {
            salt,
            ..Self::new(partitioner.partition(key.as_bytes()), server, replica)
        }
    }

    /// Human-readable identifier, `"{server}#{replica}"`.
    pub fn label(&self) -> String {
        format!("{}#{}", self.server, self.replica)
    }
}

/// The string hashed to position a virtual node.
pub fn placement_key(server: &str, replica: u32, salt: u32) -> String {
    if salt == 0 {
        format!("{}#{}", server, replica)
    } else {
        format!("{}#{}/{}", server, replica, salt)
    }
}

impl<T: Token> fmt::Display for VirtualNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VNode(token={}, server={}#{})", self.token, self.server, self.replica)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::Xxh3Partitioner;
    use crate::token::Token32;

    #[test]
    fn test_vnode_creation() {
        let vnode = VirtualNode::new(Token32(100), "a", 0);
        assert_eq!(vnode.token, Token32(100));
        assert_eq!(vnode.server, "a");
        assert_eq!(vnode.label(), "a#0");
    }

    #[test]
    fn test_place_is_deterministic() {
        let p = Xxh3Partitioner;
        assert_eq!(VirtualNode::place(&p, "a", 3, 0), VirtualNode::place(&p, "a", 3, 0));
        assert_eq!(
            VirtualNode::place(&p, "a", 3, 0).token,
            p.partition(b"a#3")
        );
    }

    #[test]
    fn test_salt_changes_position_not_identity() {
        let p = Xxh3Partitioner;
        let plain = VirtualNode::place(&p, "a", 0, 0);
        let salted = VirtualNode::place(&p, "a", 0, 1);
        assert_ne!(plain.token, salted.token);
        assert_eq!(plain.label(), salted.label());
        assert_eq!((plain.salt, salted.salt), (0, 1));
        assert_eq!(placement_key("a", 0, 1), "a#0/1");
    }
}
