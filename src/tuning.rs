//! Per-iteration choice of leapfrog step size and trajectory length.
//!
//! A chain asks its [`StepSchedule`] for `(step_size, n_leapfrog)` before every
//! transition. [`Jittered`] draws both around fixed baselines, which keeps the
//! trajectory length from locking onto a period of the target; [`Fixed`] returns
//! the same pair every time.

use num_traits::Float;
use rand::distributions::uniform::SampleUniform;
use rand::Rng;

use crate::errors::ConfigError;

pub trait StepSchedule<T: Float>: Send + Sync {
    /// Returns the step size and number of leapfrog steps for `iteration`.
    fn draw<R: Rng + ?Sized>(&self, iteration: usize, rng: &mut R) -> (T, usize);

    /// Checks the configuration before any chain starts.
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

fn check_step_size<T: Float>(step_size: T) -> Result<(), ConfigError> {
    if step_size.is_finite() && step_size > T::zero() {
        Ok(())
    } else {
        Err(ConfigError::InvalidStepSize(
            step_size.to_f64().unwrap_or(f64::NAN),
        ))
    }
}

/// `ε ~ Uniform(0, 2ε₀)` and `L = ⌈Uniform(0, 1) · 2L₀⌉` at every iteration.
///
/// Both draws have the baselines as their (approximate) means. `L` is at least 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jittered<T: Float> {
    pub base_step_size: T,
    pub base_n_leapfrog: usize,
}

impl<T: Float> Jittered<T> {
    pub fn new(base_step_size: T, base_n_leapfrog: usize) -> Self {
        Self {
            base_step_size,
            base_n_leapfrog,
        }
    }
}

impl<T> StepSchedule<T> for Jittered<T>
where
    T: Float + SampleUniform + Send + Sync,
{
    fn draw<R: Rng + ?Sized>(&self, _iteration: usize, rng: &mut R) -> (T, usize) {
        let two = T::one() + T::one();
        let step_size = rng.gen_range(T::zero()..two * self.base_step_size);
        let u: f64 = rng.gen_range(0.0..1.0);
        let n_leapfrog = ((u * 2.0 * self.base_n_leapfrog as f64).ceil() as usize).max(1);
        (step_size, n_leapfrog)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_step_size(self.base_step_size)?;
        if self.base_n_leapfrog == 0 {
            return Err(ConfigError::ZeroLeapfrogSteps);
        }
        Ok(())
    }
}

/// The same step size and trajectory length at every iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fixed<T: Float> {
    pub step_size: T,
    pub n_leapfrog: usize,
}

impl<T: Float> Fixed<T> {
    pub fn new(step_size: T, n_leapfrog: usize) -> Self {
        Self {
            step_size,
            n_leapfrog,
        }
    }
}

impl<T: Float + Send + Sync> StepSchedule<T> for Fixed<T> {
    fn draw<R: Rng + ?Sized>(&self, _iteration: usize, _rng: &mut R) -> (T, usize) {
        (self.step_size, self.n_leapfrog)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_step_size(self.step_size)?;
        if self.n_leapfrog == 0 {
            return Err(ConfigError::ZeroLeapfrogSteps);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn jittered_draws_stay_in_range() {
        let schedule = Jittered::new(0.1, 10);
        let mut rng = SmallRng::seed_from_u64(42);
        let (mut sum_eps, mut sum_l) = (0.0, 0usize);
        let (mut min_l, mut max_l) = (usize::MAX, 0);
        let n = 10_000;
        for i in 0..n {
            let (eps, l): (f64, usize) = schedule.draw(i, &mut rng);
            assert!((0.0..0.2).contains(&eps), "step size {eps} out of range");
            assert!((1..=20).contains(&l), "leapfrog count {l} out of range");
            sum_eps += eps;
            sum_l += l;
            min_l = min_l.min(l);
            max_l = max_l.max(l);
        }
        assert!((sum_eps / n as f64 - 0.1).abs() < 0.005);
        // E[ceil(20 U)] = 10.5
        assert!((sum_l as f64 / n as f64 - 10.5).abs() < 0.2);
        assert_eq!((min_l, max_l), (1, 20));
    }

    #[test]
    fn jittered_single_step_baseline() {
        let schedule = Jittered::new(0.5_f64, 1);
        let mut rng = SmallRng::seed_from_u64(7);
        for i in 0..1000 {
            let (_, l) = schedule.draw(i, &mut rng);
            assert!(l == 1 || l == 2);
        }
    }

    #[test]
    fn fixed_is_constant() {
        let schedule = Fixed::new(0.25_f32, 7);
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(schedule.draw(0, &mut rng), (0.25, 7));
        assert_eq!(schedule.draw(99, &mut rng), (0.25, 7));
    }

    #[test]
    fn validation_rejects_bad_baselines() {
        assert_eq!(
            Jittered::new(0.0, 10).validate(),
            Err(ConfigError::InvalidStepSize(0.0))
        );
        assert_eq!(
            Jittered::new(0.1, 0).validate(),
            Err(ConfigError::ZeroLeapfrogSteps)
        );
        assert!(Fixed::new(f64::NAN, 3).validate().is_err());
        assert!(Fixed::new(-0.1, 3).validate().is_err());
        assert_eq!(Fixed::new(0.1, 3).validate(), Ok(()));
    }
}
