//! Gradients of the log-density.
//!
//! The integrator only talks to [`GradientTarget`]. The crate's default
//! implementation is [`FiniteDifference`], which wraps any [`LogDensity`] and
//! differentiates it numerically; targets with a known gradient implement the
//! trait directly and skip the `2d` extra density evaluations per call.

use num_traits::Float;

use crate::distributions::LogDensity;
use crate::errors::ConfigError;

/// Finite-difference step used by [`FiniteDifference::new`].
pub const DEFAULT_EPSILON: f64 = 1e-4;

/// A log-density that can also report its gradient with respect to the parameters.
pub trait GradientTarget<T: Float>: LogDensity<T> {
    /// Writes the gradient of [`LogDensity::log_density`] at `theta` into `grad`.
    ///
    /// `grad` has the same length as `theta`. Non-finite components are allowed and
    /// are propagated by the integrator rather than treated as failures.
    fn gradient(&self, theta: &[T], grad: &mut [T]);
}

/**
Central-difference gradient of a wrapped density.

For each coordinate `k` the density is evaluated at `theta ± e·u_k` and the gradient
component is `(f(theta + e·u_k) - f(theta - e·u_k)) / (2e)`. The error is `O(e²)`;
forward differences would leave an `O(e)` bias that breaks the reversibility of the
leapfrog map. `e` is fixed for the whole run.

```rust
use mini_hmc::distributions::LogDensity;
use mini_hmc::gradient::{FiniteDifference, GradientTarget};

let target = FiniteDifference::new(|x: &[f64]| -0.5 * x[0] * x[0]);
let mut grad = [0.0];
target.gradient(&[2.0], &mut grad);
assert!((grad[0] + 2.0).abs() < 1e-8);
assert_eq!(target.log_density(&[2.0]), -2.0);
```
*/
#[derive(Debug, Clone, PartialEq)]
pub struct FiniteDifference<D, T: Float> {
    pub density: D,
    epsilon: T,
}

impl<D, T> FiniteDifference<D, T>
where
    D: LogDensity<T>,
    T: Float,
{
    pub fn new(density: D) -> Self {
        Self {
            density,
            epsilon: T::from(DEFAULT_EPSILON).unwrap(),
        }
    }

    /// Replaces the finite-difference step.
    pub fn with_epsilon(mut self, epsilon: T) -> Result<Self, ConfigError> {
        if !(epsilon.is_finite() && epsilon > T::zero()) {
            return Err(ConfigError::InvalidEpsilon(
                epsilon.to_f64().unwrap_or(f64::NAN),
            ));
        }
        self.epsilon = epsilon;
        Ok(self)
    }

    pub fn epsilon(&self) -> T {
        self.epsilon
    }
}

impl<D: LogDensity<T>, T: Float> LogDensity<T> for FiniteDifference<D, T> {
    fn log_density(&self, theta: &[T]) -> T {
        self.density.log_density(theta)
    }
}

impl<D: LogDensity<T>, T: Float> GradientTarget<T> for FiniteDifference<D, T> {
    fn gradient(&self, theta: &[T], grad: &mut [T]) {
        let two_eps = self.epsilon + self.epsilon;
        let mut probe = theta.to_vec();
        for (k, g) in grad.iter_mut().enumerate() {
            probe[k] = theta[k] + self.epsilon;
            let up = self.density.log_density(&probe);
            probe[k] = theta[k] - self.epsilon;
            let down = self.density.log_density(&probe);
            probe[k] = theta[k];
            *g = (up - down) / two_eps;
        }
    }
}
