//! Diagonal mass matrix.

use num_traits::Float;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::errors::ConfigError;

/// Per-dimension masses `M` of a diagonal mass matrix.
///
/// Momentum is drawn as `N(0, diag(M))` and the kinetic energy is `½ Σ φ²/M`. The
/// vector is validated once and never changes during a run; `inv_mass` and
/// `sqrt_mass` are precomputed to keep the leapfrog loop division-free.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalMass<T: Float> {
    mass: Vec<T>,
    inv_mass: Vec<T>,
    sqrt_mass: Vec<T>,
}

impl<T: Float> DiagonalMass<T> {
    pub fn new(mass: Vec<T>) -> Result<Self, ConfigError> {
        if mass.is_empty() {
            return Err(ConfigError::EmptyParameters);
        }
        if let Some((index, value)) = mass
            .iter()
            .enumerate()
            .find(|(_, m)| !(m.is_finite() && **m > T::zero()))
        {
            return Err(ConfigError::InvalidMass {
                index,
                value: value.to_f64().unwrap_or(f64::NAN),
            });
        }
        let inv_mass = mass.iter().map(|m| m.recip()).collect();
        let sqrt_mass = mass.iter().map(|m| m.sqrt()).collect();
        Ok(Self {
            mass,
            inv_mass,
            sqrt_mass,
        })
    }

    /// Identity mass matrix in `dim` dimensions.
    pub fn unit(dim: usize) -> Self {
        Self {
            mass: vec![T::one(); dim],
            inv_mass: vec![T::one(); dim],
            sqrt_mass: vec![T::one(); dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.mass.len()
    }

    pub fn mass(&self) -> &[T] {
        &self.mass
    }

    pub fn inv_mass(&self) -> &[T] {
        &self.inv_mass
    }

    /// Draws a fresh momentum `φ ~ N(0, diag(M))`.
    pub fn sample_momentum<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<T>
    where
        StandardNormal: Distribution<T>,
    {
        self.sqrt_mass
            .iter()
            .map(|&s| {
                let z: T = rng.sample(StandardNormal);
                s * z
            })
            .collect()
    }

    /// `½ Σ φ_k² / M_k`.
    pub fn kinetic_energy(&self, momentum: &[T]) -> T {
        let half = T::from(0.5).unwrap();
        half * momentum
            .iter()
            .zip(self.inv_mass.iter())
            .fold(T::zero(), |acc, (&p, &w)| acc + p * p * w)
    }
}
