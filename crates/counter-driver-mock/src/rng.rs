//! Seeded RNG for reproducible simulated readings.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded random source owned by one simulated counter.
pub struct MockRng {
    inner: ChaCha8Rng,
}

impl MockRng {
    /// Create a new RNG with optional seed.
    /// If seed is None, uses a random seed from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let inner = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { inner }
    }

    /// True with probability `rate` (clamped to 0..=1).
    pub fn should_fail(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        self.inner.gen::<f64>() < rate
    }

    /// Multiplicative jitter factor in `[1 - relative, 1 + relative]`.
    pub fn jitter(&mut self, relative: f64) -> f64 {
        if relative <= 0.0 {
            return 1.0;
        }
        1.0 + self.inner.gen_range(-relative..=relative)
    }
}

impl Default for MockRng {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for MockRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRng").field("inner", &"<ChaCha8Rng>").finish()
    }
}
