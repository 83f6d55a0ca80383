//! 32-bit token for coarse, demo-resolution rings.

use crate::token::traits::{in_unit_range, Token};
use std::fmt;

const SPACE: f64 = 4_294_967_296.0; // 2^32

/// 32-bit token.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Token32(pub u32);

impl Token for Token32 {
    const MIN: Self = Token32(0);
    const MAX: Self = Token32(u32::MAX);

    fn fraction(&self) -> f64 {
        self.0 as f64 / SPACE
    }

    fn from_fraction(fraction: f64) -> Option<Self> {
        if !in_unit_range(fraction) {
            return None;
        }
        let value = (fraction * SPACE) as u64;
        Some(Token32(value.min(u32::MAX as u64) as u32))
    }
}

impl fmt::Display for Token32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
