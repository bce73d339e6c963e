//! Seeded randomness for latency jitter.

use std::time::Duration;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic random number generator for reproducible host timing.
///
/// Uses ChaCha8 so the same seed always yields the same latency sequence.
#[derive(Debug)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates random number in range [min, max).
    pub fn random_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + (self.rng.next_u64() % (max - min))
    }

    /// `base` plus a uniformly drawn extra delay below `jitter`.
    pub fn jittered(&mut self, base: Duration, jitter: Duration) -> Duration {
        let extra = self.random_range(0, jitter.as_micros() as u64);
        base + Duration::from_micros(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = DeterministicRng::from_seed(99);
        let mut b = DeterministicRng::from_seed(99);

        for _ in 0..16 {
            assert_eq!(a.random_range(0, 1000), b.random_range(0, 1000));
        }
        assert_eq!(a.seed(), 99);
    }

    #[test]
    fn test_jitter_bounds() {
        let mut rng = DeterministicRng::from_seed(1);
        let base = Duration::from_millis(10);
        let jitter = Duration::from_millis(5);

        for _ in 0..100 {
            let delay = rng.jittered(base, jitter);
            assert!(delay >= base && delay < base + jitter);
        }
        assert_eq!(rng.jittered(base, Duration::ZERO), base);
    }
}
