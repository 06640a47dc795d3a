//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ for fast, reproducible randomness. The match controller
//! draws respawn points from it, so the same seed and the same inputs replay
//! the same match.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use super::vec3::Vec3;

/// Deterministic PRNG using Xorshift128+.
///
/// # Example
///
/// ```
/// use strikezone::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(12345);
/// let mut b = DeterministicRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// SplitMix64 spreads weak seeds (0, 1, 2...) over the whole state.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Xorshift must never run from the all-zero state
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a float in [0, 1).
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        // 24 mantissa bits give an exact, uniform grid in [0, 1)
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Generate a float in [min, max).
    #[inline]
    pub fn next_f32_range(&mut self, min: f32, max: f32) -> f32 {
        if min >= max {
            return min;
        }
        min + self.next_f32() * (max - min)
    }

    /// Uniform point on the horizontal disc around `center`.
    ///
    /// Rejection sampling keeps the distribution flat; the vertical
    /// coordinate is taken from `center` unchanged.
    pub fn point_in_disc(&mut self, center: Vec3, radius: f32) -> Vec3 {
        if radius <= 0.0 {
            return center;
        }
        loop {
            let x = self.next_f32_range(-radius, radius);
            let z = self.next_f32_range(-radius, radius);
            if x * x + z * z <= radius * radius {
                return Vec3::new(center.x + x, center.y, center.z + z);
            }
        }
    }

}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive the seed for one match from the server seed and the match number.
///
/// Every match in a session gets a distinct but reproducible stream.
pub fn derive_match_seed(server_seed: u64, match_number: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"STRIKEZONE_SEED_V1");
    hasher.update(server_seed.to_le_bytes());
    hasher.update(match_number.to_le_bytes());
    let hash = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[0..8]);
    u64::from_le_bytes(bytes)
}

// =============================================================================
// TESTS
// =============================================================================
