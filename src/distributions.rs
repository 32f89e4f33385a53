/*!
Target densities for the HMC engine.

A target is anything implementing [`LogDensity`]: a pure function from a parameter
vector to an unnormalized log-posterior value. Infeasible parameter values are not
errors; a target reports them as negative infinity so the Metropolis step rejects
them naturally.

Plain closures are targets too:

```rust
use mini_hmc::distributions::LogDensity;

let log_p = |theta: &[f64]| -0.5 * theta.iter().map(|x| x * x).sum::<f64>();
assert_eq!(log_p.log_density(&[1.0, 1.0]), -1.0);
```

The module also ships a few reference targets: [`DiagonalGaussian`],
[`BoxConstrained`] and the regression posterior [`LinearRegression`].
*/

use ndarray::{Array1, Array2};
use num_traits::Float;
use std::f64::consts::PI;

use crate::errors::ConfigError;
use crate::gradient::GradientTarget;

/// An unnormalized log-posterior over a fixed-dimension parameter vector.
///
/// Implementations must be pure: the same `theta` always yields the same value and
/// evaluation has no side effects. Chains share one instance across threads.
pub trait LogDensity<T: Float> {
    /// Returns the log of the unnormalized density at `theta`, or negative infinity
    /// when `theta` lies outside the support.
    fn log_density(&self, theta: &[T]) -> T;
}

impl<T, F> LogDensity<T> for F
where
    T: Float,
    F: Fn(&[T]) -> T,
{
    fn log_density(&self, theta: &[T]) -> T {
        self(theta)
    }
}

/// Maps NaN to negative infinity so that a broken evaluation reads as "outside the support".
fn infeasible_if_nan<T: Float>(value: T) -> T {
    if value.is_nan() {
        T::neg_infinity()
    } else {
        value
    }
}

/**
Independent normal coordinates with per-dimension mean and standard deviation.

A one-dimensional `DiagonalGaussian` with mean 5 and standard deviation 2 is the
`Normal(5, 2)` target; `DiagonalGaussian::standard(2)` is the standard bivariate
Gaussian. Besides the density it provides its exact gradient, so it can be sampled
with or without finite differences.

```rust
use mini_hmc::distributions::{DiagonalGaussian, LogDensity};

let target = DiagonalGaussian::new(vec![5.0], vec![2.0]).unwrap();
assert_eq!(target.log_density(&[5.0]), 0.0);
assert_eq!(target.log_density(&[7.0]), -0.5);
assert_eq!(target.log_density(&[5.0, 0.0]), f64::NEG_INFINITY);
```
*/
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalGaussian<T: Float> {
    pub mean: Vec<T>,
    pub std: Vec<T>,
}

impl<T: Float> DiagonalGaussian<T> {
    pub fn new(mean: Vec<T>, std: Vec<T>) -> Result<Self, ConfigError> {
        if mean.len() != std.len() {
            return Err(ConfigError::LengthMismatch {
                what: "mean and std",
                left: mean.len(),
                right: std.len(),
            });
        }
        Ok(Self { mean, std })
    }

    /// Zero mean, unit variance in `dim` dimensions.
    pub fn standard(dim: usize) -> Self {
        Self {
            mean: vec![T::zero(); dim],
            std: vec![T::one(); dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

impl<T: Float> LogDensity<T> for DiagonalGaussian<T> {
    fn log_density(&self, theta: &[T]) -> T {
        if theta.len() != self.dim() {
            return T::neg_infinity();
        }
        let half = T::from(0.5).unwrap();
        let sum = theta
            .iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .fold(T::zero(), |acc, (&x, (&m, &s))| {
                let z = (x - m) / s;
                acc + z * z
            });
        infeasible_if_nan(-half * sum)
    }
}

impl<T: Float> GradientTarget<T> for DiagonalGaussian<T> {
    fn gradient(&self, theta: &[T], grad: &mut [T]) {
        if theta.len() != self.dim() {
            grad.iter_mut().for_each(|g| *g = T::nan());
            return;
        }
        for (g, (&x, (&m, &s))) in grad
            .iter_mut()
            .zip(theta.iter().zip(self.mean.iter().zip(self.std.iter())))
        {
            *g = -(x - m) / (s * s);
        }
    }
}

/// Restricts an inner target to the axis-aligned box `[lower, upper]`.
///
/// Outside the box (or for NaN coordinates) the log-density is negative infinity.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxConstrained<D, T: Float> {
    pub inner: D,
    pub lower: Vec<T>,
    pub upper: Vec<T>,
}

impl<D, T: Float> BoxConstrained<D, T> {
    pub fn new(inner: D, lower: Vec<T>, upper: Vec<T>) -> Result<Self, ConfigError> {
        if lower.len() != upper.len() {
            return Err(ConfigError::LengthMismatch {
                what: "lower and upper bounds",
                left: lower.len(),
                right: upper.len(),
            });
        }
        Ok(Self {
            inner,
            lower,
            upper,
        })
    }

    fn contains(&self, theta: &[T]) -> bool {
        theta.len() == self.lower.len()
            && theta
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(&x, (&lo, &hi))| x >= lo && x <= hi)
    }
}

impl<D: LogDensity<T>, T: Float> LogDensity<T> for BoxConstrained<D, T> {
    fn log_density(&self, theta: &[T]) -> T {
        if self.contains(theta) {
            infeasible_if_nan(self.inner.log_density(theta))
        } else {
            T::neg_infinity()
        }
    }
}

/**
Posterior of a Bayesian linear regression with unknown noise scale.

The parameter vector is `[β_0, ..., β_{p-1}, σ]` where `p` is the number of columns
of the design matrix (include a column of ones for an intercept). The model is

- `β_j ~ Normal(0, coef_prior_std)`
- `σ ~ Exponential(scale_prior_rate)`
- `y_i ~ Normal(x_i · β, σ)`

and every term is accumulated in log space. A non-positive or non-finite `σ`, any
non-finite coefficient, or a parameter vector of the wrong length yields negative
infinity.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegression<T: Float> {
    pub x: Array2<T>,
    pub y: Array1<T>,
    pub coef_prior_std: T,
    pub scale_prior_rate: T,
}

impl<T: Float> LinearRegression<T> {
    /// Binds predictors and response, with weakly informative default priors
    /// (`coef_prior_std = 10`, `scale_prior_rate = 1`).
    pub fn new(x: Array2<T>, y: Array1<T>) -> Result<Self, ConfigError> {
        if x.nrows() != y.len() {
            return Err(ConfigError::DataShapeMismatch {
                rows: x.nrows(),
                responses: y.len(),
            });
        }
        Ok(Self {
            x,
            y,
            coef_prior_std: T::from(10.0).unwrap(),
            scale_prior_rate: T::one(),
        })
    }

    pub fn with_priors(mut self, coef_prior_std: T, scale_prior_rate: T) -> Self {
        self.coef_prior_std = coef_prior_std;
        self.scale_prior_rate = scale_prior_rate;
        self
    }

    /// Dimension of the parameter vector: one coefficient per column plus the scale.
    pub fn dim(&self) -> usize {
        self.x.ncols() + 1
    }
}

impl<T: Float> LogDensity<T> for LinearRegression<T> {
    fn log_density(&self, theta: &[T]) -> T {
        let p = self.x.ncols();
        if theta.len() != p + 1 {
            return T::neg_infinity();
        }
        let (beta, sigma) = (&theta[..p], theta[p]);
        if !(sigma.is_finite() && sigma > T::zero()) || beta.iter().any(|b| !b.is_finite()) {
            return T::neg_infinity();
        }

        let half = T::from(0.5).unwrap();
        let half_ln_2pi = half * T::from(2.0 * PI).unwrap().ln();

        let log_prior_beta = beta.iter().fold(T::zero(), |acc, &b| {
            let z = b / self.coef_prior_std;
            acc - half * z * z - self.coef_prior_std.ln() - half_ln_2pi
        });
        let log_prior_sigma = self.scale_prior_rate.ln() - self.scale_prior_rate * sigma;

        let ln_sigma = sigma.ln();
        let log_lik = self
            .x
            .rows()
            .into_iter()
            .zip(self.y.iter())
            .fold(T::zero(), |acc, (row, &y)| {
                let fitted = row
                    .iter()
                    .zip(beta)
                    .fold(T::zero(), |s, (&x, &b)| s + x * b);
                let z = (y - fitted) / sigma;
                acc - half * z * z - ln_sigma - half_ln_2pi
            });

        infeasible_if_nan(log_prior_beta + log_prior_sigma + log_lik)
    }
}
