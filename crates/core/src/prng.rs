//! Seedable jitter source for particle momentum.
//!
//! Momentum is a small random kick applied to every particle on every tick.
//! Runs with the same seed and the same input produce the same positions.

use serde::{Deserialize, Serialize};

use crate::vector::Vector2;

/// Xorshift64 generator (shifts 13, 7, 17).
///
/// A zero seed is replaced by a fixed non-zero constant because zero is a
/// fixed point of the recurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    const ZERO_SEED_REPLACEMENT: u64 = 0x9E37_79B9_7F4A_7C15;

    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 {
                Self::ZERO_SEED_REPLACEMENT
            } else {
                seed
            },
        }
    }

    /// Derives an independent generator, used to give each particle its own
    /// stream without sharing mutable state across pools.
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u64().rotate_left(29) ^ 0xD1B5_4A32_D192_ED03)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Uniform value in `[0, 1)` built from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform value in `[-0.5, 0.5)`.
    pub fn next_centered(&mut self) -> f64 {
        self.next_f64() - 0.5
    }

    /// Random kick with independent components in `[-0.5, 0.5)`, scaled by
    /// `momentum`.
    pub fn jitter(&mut self, momentum: f64) -> Vector2 {
        let x = self.next_centered();
        let y = self.next_centered();
        Vector2::new(x, y) * momentum
    }
}
