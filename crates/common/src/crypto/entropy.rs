use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Shared handle over the random source used for keys and nonces
///
/// Every component that needs randomness is handed an `Entropy`
///  at construction, so tests can swap in a seeded source without
///  touching any global state.
#[derive(Clone)]
pub struct Entropy(Arc<Mutex<StdRng>>);

impl fmt::Debug for Entropy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Entropy(..)")
    }
}

impl Default for Entropy {
    fn default() -> Self {
        Self::from_os()
    }
}

impl Entropy {
    /// Seed a new source from the operating system
    pub fn from_os() -> Self {
        Self(Arc::new(Mutex::new(StdRng::from_os_rng())))
    }

    /// Deterministic source for tests and reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self(Arc::new(Mutex::new(StdRng::seed_from_u64(seed))))
    }

    pub fn fill(&self, buf: &mut [u8]) {
        self.0.lock().fill_bytes(buf);
    }

    pub fn array<const N: usize>(&self) -> [u8; N] {
        let mut buf = [0u8; N];
        self.fill(&mut buf);
        buf
    }
}
