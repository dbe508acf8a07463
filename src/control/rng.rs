//! Session RNG seeding
//!
//! Each randomized component gets its own `StdRng`. With a session seed the
//! component seeds are derived as `seed XOR (salt * MIXING_CONSTANT)` so the
//! via-pool shuffle, the synthesis search and spawn selection stay
//! reproducible independently of each other.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// 64-bit fractional golden-ratio constant for seed mixing
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

pub const SALT_VIA_POOL: u64 = 1;
pub const SALT_SYNTHESIS: u64 = 2;
pub const SALT_SPAWN: u64 = 3;

/// RNG for one component, seeded from the session seed when present
pub fn component_rng(seed: Option<u64>, salt: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ salt.wrapping_mul(MIXING_CONSTANT)),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}
