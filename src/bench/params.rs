//! Random parameter generation for transactions and the mix selector.

use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::{DlBenchError, Result};

/// Per-driver source of random transaction parameters
#[derive(Debug, Clone)]
pub struct ParameterGenerator {
    rng: SmallRng,
}

impl ParameterGenerator {
    /// Generator seeded from the operating system
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    /// Reproducible generator
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Uniform integer in `[min, max]`, both bounds inclusive
    pub fn random_int(&mut self, min: i64, max: i64) -> Result<i64> {
        if min > max {
            return Err(DlBenchError::Config(format!(
                "Invalid random range: {} > {}",
                min, max
            )));
        }
        Ok(self.rng.gen_range(min..=max))
    }

    /// Alphanumeric string of exactly `len` characters
    pub fn random_string(&mut self, len: usize) -> Result<String> {
        if len < 1 {
            return Err(DlBenchError::Config(
                "Random string length must be at least 1".to_string(),
            ));
        }
        Ok(Alphanumeric.sample_string(&mut self.rng, len))
    }
}

impl Default for ParameterGenerator {
    fn default() -> Self {
        Self::new()
    }
}
