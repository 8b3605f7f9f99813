//! Deterministic random number handle
//!
//! Every iteration owns an RNG seeded from `(scenario seed, iteration
//! index)`. The handle is cheap to clone and safe to share between the
//! chaos context, injector background tasks, and user code; all of them
//! draw from the same stream so runs with the same seed reproduce the
//! same decisions in the same order.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Cloneable handle to a seeded random number generator.
#[derive(Clone, Debug)]
pub struct ChaosRng {
    seed: u64,
    inner: Arc<Mutex<StdRng>>,
}

impl ChaosRng {
    /// Create a handle from an explicit seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            inner: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Derive the per-iteration handle from the scenario seed.
    ///
    /// The mix keeps nearby iteration indices from producing correlated
    /// streams.
    pub fn for_iteration(scenario_seed: u64, iteration: u64) -> Self {
        let mixed = mix64(scenario_seed ^ mix64(iteration.wrapping_add(0x9E37_79B9_7F4A_7C15)));
        Self::from_seed(mixed)
    }

    /// The seed this handle was constructed with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform draw in `[0, 1)`.
    pub fn random_f64(&self) -> f64 {
        self.inner.lock().random::<f64>()
    }

    /// Bernoulli draw with the given probability, clamped to `[0, 1]`.
    pub fn random_bool(&self, probability: f64) -> bool {
        let p = probability.clamp(0.0, 1.0);
        self.inner.lock().random_bool(p)
    }

    /// Uniform draw in the inclusive range `[min, max]`.
    pub fn random_range_u64(&self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        self.inner.lock().random_range(min..=max)
    }

    /// Uniform draw of a `usize` index in `[0, len)`. Returns 0 for an
    /// empty range.
    pub fn random_index(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.inner.lock().random_range(0..len)
    }
}

/// splitmix64 finalizer.
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
