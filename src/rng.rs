//! Deterministic random number generation.
//!
//! Every generator is derived from `(run seed, stream, worker, tick)` so parallel
//! stages never share one generator and results do not depend on thread scheduling.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub type WorkerRng = ChaCha8Rng;

/// Named generator streams, one per randomised stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    Decision = 1,
}

/// Run-level seed source handed to stages through the tick context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngManager {
    master_seed: u64,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self { master_seed: seed }
    }

    /// Uses `seed` when given, otherwise draws one from OS entropy.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        Self::new(seed.unwrap_or_else(rand::random::<u64>))
    }

    pub fn seed(&self) -> u64 {
        self.master_seed
    }

    /// Generator for one worker of one stream on one tick.
    pub fn worker_rng(&self, stream: RngStream, worker_id: u64, tick: u64) -> WorkerRng {
        ChaCha8Rng::seed_from_u64(self.derive_seed(stream as u64, worker_id, tick))
    }

    fn derive_seed(&self, stream: u64, worker_id: u64, tick: u64) -> u64 {
        let mut seed = self.master_seed;
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= stream.wrapping_mul(1103515245);
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= worker_id.wrapping_mul(48271);
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= tick.wrapping_mul(69069);
        seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn same_seed_same_values() {
        let a = RngManager::new(42);
        let b = RngManager::new(42);

        let val1: f64 = a.worker_rng(RngStream::Decision, 3, 1).gen();
        let val2: f64 = b.worker_rng(RngStream::Decision, 3, 1).gen();

        assert_eq!(val1, val2, "Same seed should produce same values");
    }

    #[test]
    fn ticks_and_workers_get_independent_streams() {
        let rng = RngManager::new(42);

        let base: f64 = rng.worker_rng(RngStream::Decision, 1, 1).gen();
        let next_tick: f64 = rng.worker_rng(RngStream::Decision, 1, 2).gen();
        let other_worker: f64 = rng.worker_rng(RngStream::Decision, 2, 1).gen();

        assert_ne!(base, next_tick);
        assert_ne!(base, other_worker);
    }

    #[test]
    fn explicit_seed_is_kept() {
        assert_eq!(RngManager::from_optional_seed(Some(7)).seed(), 7);
    }
}
