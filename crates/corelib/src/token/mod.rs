//! Token abstraction module for consistent hashing.
//!
//! Tokens represent positions on the hash ring and must be comparable,
//! hashable, and thread-safe. Two coordinate spaces are provided: the
//! canonical 160-bit space and a coarse 32-bit one for demos.

pub mod token160;
pub mod token32;
pub mod traits;

pub use token160::Token160;
pub use token32::Token32;
pub use traits::Token;
