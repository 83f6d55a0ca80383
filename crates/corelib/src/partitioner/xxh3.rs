//! XXH3 partitioner producing 32-bit tokens.

use crate::partitioner::traits::Partitioner;
use crate::token::Token32;
use xxhash_rust::xxh3::xxh3_64;

/// Hashes keys with XXH3 and keeps the high 32 bits.
///
/// Coarse enough that ring layouts are easy to eyeball in a demo.
#[derive(Clone, Copy, Debug, Default)]
pub struct Xxh3Partitioner;

impl Partitioner for Xxh3Partitioner {
    type TokenType = Token32;

    fn partition(&self, key: &[u8]) -> Self::TokenType {
        Token32((xxh3_64(key) >> 32) as u32)
    }

    fn name(&self) -> &'static str {
        "Xxh3Partitioner"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let p = Xxh3Partitioner;
        assert_eq!(p.partition(b"node1#0"), p.partition(b"node1#0"));
        assert_eq!(p.partition(b"node1#0"), Token32((xxh3_64(b"node1#0") >> 32) as u32));
    }
}
