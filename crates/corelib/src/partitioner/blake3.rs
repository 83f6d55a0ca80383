//! BLAKE3 partitioner producing 160-bit tokens.

use crate::partitioner::traits::Partitioner;
use crate::token::Token160;

/// Hashes keys with BLAKE3 and keeps the first 160 bits of the digest.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Partitioner;

impl Partitioner for Blake3Partitioner {
    type TokenType = Token160;

    fn partition(&self, key: &[u8]) -> Self::TokenType {
        Token160::from_digest(::blake3::hash(key).as_bytes())
    }

    fn name(&self) -> &'static str {
        "Blake3Partitioner"
    }
}
