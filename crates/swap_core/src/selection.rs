//! Index selection strategies used to pick vehicle and station types.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    Uniform,
    /// Geometric over indices, wrapped modulo the list length, so the first
    /// entries are favoured.
    BiasedGeometric { beta: f64 },
}

impl SelectionStrategy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            SelectionStrategy::Uniform => Ok(()),
            SelectionStrategy::BiasedGeometric { beta } if beta > 0.0 && beta < 1.0 => Ok(()),
            SelectionStrategy::BiasedGeometric { beta } => Err(ConfigError::InvalidBeta(beta)),
        }
    }

    /// Picks an index in `0..len`. `len` must be non-zero.
    pub fn select<R: Rng + ?Sized>(&self, len: usize, rng: &mut R) -> usize {
        debug_assert!(len > 0, "select from an empty list");
        match *self {
            SelectionStrategy::Uniform => rng.gen_range(0..len),
            SelectionStrategy::BiasedGeometric { beta } => {
                // u in (0, 1] keeps ln finite.
                let u = 1.0 - rng.gen::<f64>();
                let k = (u.ln() / (1.0 - beta).ln()).floor();
                (k as usize) % len
            }
        }
    }
}
