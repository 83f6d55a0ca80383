//! 160-bit token, the canonical ring coordinate space.

use crate::token::traits::{in_unit_range, Token};
use std::fmt;

/// Width of the token in bytes.
pub const TOKEN160_BYTES: usize = 20;

/// 160-bit big-endian token.
///
/// Byte arrays compare lexicographically, which for a big-endian layout is
/// the same as numeric order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Token160(pub [u8; TOKEN160_BYTES]);

impl Token160 {
    /// Build a token whose top 64 bits are `high` and the rest zero.
    pub fn from_high_u64(high: u64) -> Self {
        let mut bytes = [0u8; TOKEN160_BYTES];
        bytes[..8].copy_from_slice(&high.to_be_bytes());
        Token160(bytes)
    }

    /// The top 64 bits of the token.
    pub fn high_u64(&self) -> u64 {
        let mut high = [0u8; 8];
        high.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(high)
    }

    /// Take the first 20 bytes of a wider digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; TOKEN160_BYTES];
        let n = digest.len().min(TOKEN160_BYTES);
        bytes[..n].copy_from_slice(&digest[..n]);
        Token160(bytes)
    }
}

impl Token for Token160 {
    const MIN: Self = Token160([0; TOKEN160_BYTES]);
    const MAX: Self = Token160([u8::MAX; TOKEN160_BYTES]);

    fn fraction(&self) -> f64 {
        // 53 bits is all an f64 mantissa holds; keeps the result below 1.0.
        (self.high_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn from_fraction(fraction: f64) -> Option<Self> {
        if !in_unit_range(fraction) {
            return None;
        }
        let high = ((fraction * (1u64 << 53) as f64) as u64) << 11;
        Some(Self::from_high_u64(high))
    }
}

impl fmt::Display for Token160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
