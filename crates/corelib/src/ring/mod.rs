//! Consistent hash ring implementation.
//!
//! The ring manages virtual node positions and provides successor lookup
//! for finding the server responsible for a key.

pub mod ring;

pub use ring::HashRing;
