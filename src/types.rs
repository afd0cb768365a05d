//! Shared primitive types.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// 32-byte BLAKE3 digest
pub type Hash = [u8; 32];

/// Content hash of an input file, keyed into the cache registry as lowercase hex.
pub type ContentHash = Hash;

/// Token usage reported by one completion call or summed over many.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), |mut acc, usage| {
            acc += usage;
            acc
        })
    }
}
