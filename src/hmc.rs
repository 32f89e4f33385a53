//! Hamiltonian (Hybrid) Monte Carlo with a diagonal mass matrix.
//!
//! One transition draws a momentum, integrates with [`crate::leapfrog::leapfrog`] and
//! applies a Metropolis correction. Every numerical accident (infeasible start,
//! trajectory leaving the support, non-finite gradient, NaN acceptance ratio) ends the
//! same way: the proposal is rejected and the chain stays where it was.
//!
//! [`HMCMarkovChain`] drives one chain with its own random stream, asking a
//! [`StepSchedule`] for the step size and trajectory length of each iteration.
//! [`HMC`] owns several such chains and runs them in parallel through
//! [`crate::core::ChainRunner`].
//!
//! ```rust
//! use mini_hmc::core::ChainRunner;
//! use mini_hmc::distributions::DiagonalGaussian;
//! use mini_hmc::gradient::FiniteDifference;
//! use mini_hmc::hmc::HMC;
//! use mini_hmc::tuning::Jittered;
//!
//! let target = FiniteDifference::new(DiagonalGaussian::new(vec![5.0], vec![2.0]).unwrap());
//! let mut sampler = HMC::new(target, vec![vec![0.0]; 2], Jittered::new(0.1, 10))
//!     .unwrap()
//!     .set_seed(42);
//! let sample = sampler.run(200, 100).unwrap();
//! assert_eq!(sample.draws.shape(), &[200, 2, 1]);
//! assert_eq!(sample.post_warmup().shape(), &[100, 2, 1]);
//! ```

use num_traits::Float;
use rand::distributions::uniform::SampleUniform;
use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use std::sync::Arc;

use crate::core::{ChainOutput, HasChains, MarkovChain, StepInfo};
use crate::errors::ConfigError;
use crate::gradient::GradientTarget;
use crate::leapfrog::leapfrog;
use crate::mass::DiagonalMass;
use crate::tuning::StepSchedule;

/// Energy error above which a transition is flagged divergent.
pub const MAX_ENERGY_ERROR: f64 = 1000.0;

/// Outcome of a single HMC transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<T> {
    /// The proposal if it was accepted, otherwise a copy of the starting point.
    pub position: Vec<T>,
    /// `min(1, exp(logP_new - logP_old))`, with NaN ratios mapped to 0.
    pub accept_prob: T,
    pub accepted: bool,
    /// The starting point had a finite joint density but the trajectory did not end
    /// in one, or lost more than [`MAX_ENERGY_ERROR`] of it. Diagnostic only.
    pub divergent: bool,
}

/// One Metropolis-corrected HMC update from `current`.
///
/// 1. `φ ~ N(0, diag(M))`
/// 2. `logP_old = log p(θ) - ½ Σ φ²/M`
/// 3. leapfrog for `n_leapfrog` steps of size `step_size`
/// 4. `logP_new = log p(θ*) - ½ Σ φ*²/M`
/// 5. `r = exp(logP_new - logP_old)`, 0 if NaN or if `θ*` is not finite
/// 6. accept `θ*` iff `u < min(r, 1)` for `u ~ U(0, 1)`
pub fn transition<T, G, R>(
    target: &G,
    current: &[T],
    step_size: T,
    n_leapfrog: usize,
    mass: &DiagonalMass<T>,
    rng: &mut R,
) -> Transition<T>
where
    T: Float + SampleUniform,
    G: GradientTarget<T> + ?Sized,
    R: Rng + ?Sized,
    StandardNormal: Distribution<T>,
{
    let momentum = mass.sample_momentum(rng);
    let log_p_old = target.log_density(current) - mass.kinetic_energy(&momentum);

    let (proposal, proposal_momentum) =
        leapfrog(target, current, &momentum, step_size, n_leapfrog, mass);
    let log_p_new = target.log_density(&proposal) - mass.kinetic_energy(&proposal_momentum);

    let proposal_finite = proposal.iter().all(|x| x.is_finite());
    let ratio = (log_p_new - log_p_old).exp();
    let accept_prob = if ratio.is_nan() || !proposal_finite {
        T::zero()
    } else {
        ratio.min(T::one())
    };

    let divergent = log_p_old.is_finite()
        && (!log_p_new.is_finite()
            || !proposal_finite
            || log_p_old - log_p_new > T::from(MAX_ENERGY_ERROR).unwrap());

    let u: T = rng.gen_range(T::zero()..T::one());
    let accepted = u < accept_prob;
    let position = if accepted {
        proposal
    } else {
        current.to_vec()
    };

    Transition {
        position,
        accept_prob,
        accepted,
        divergent,
    }
}

/// A single HMC chain with its own random stream.
#[derive(Debug, Clone)]
pub struct HMCMarkovChain<T: Float, G, S> {
    /// The target, shared read-only with the other chains.
    pub target: Arc<G>,
    /// Supplies `(step_size, n_leapfrog)` for every iteration.
    pub schedule: S,
    pub mass: DiagonalMass<T>,
    /// The current state of the chain.
    pub current_state: Vec<T>,
    /// The chain-specific random seed.
    pub seed: u64,
    /// The random number generator for this chain.
    pub rng: SmallRng,
    iteration: usize,
}

impl<T, G, S> HMCMarkovChain<T, G, S>
where
    T: Float + SampleUniform,
    G: GradientTarget<T>,
    S: StepSchedule<T>,
    StandardNormal: Distribution<T>,
{
    /// Creates a chain starting at `initial_state`.
    ///
    /// The chain gets a random seed; use [`HMCMarkovChain::set_seed`] for reproducibility.
    /// A standalone chain reports itself as chain 0 in its errors; [`HMC::new`]
    /// rewrites them with [`ConfigError::for_chain`].
    pub fn new(
        target: Arc<G>,
        schedule: S,
        mass: DiagonalMass<T>,
        initial_state: &[T],
    ) -> Result<Self, ConfigError> {
        schedule.validate()?;
        if initial_state.is_empty() {
            return Err(ConfigError::EmptyParameters);
        }
        if mass.dim() != initial_state.len() {
            return Err(ConfigError::MassDimensionMismatch {
                expected: initial_state.len(),
                found: mass.dim(),
            });
        }
        if let Some(index) = initial_state.iter().position(|x| !x.is_finite()) {
            return Err(ConfigError::NonFiniteStart { chain: 0, index });
        }
        let seed = thread_rng().gen::<u64>();
        Ok(Self {
            target,
            schedule,
            mass,
            current_state: initial_state.to_vec(),
            seed,
            rng: SmallRng::seed_from_u64(seed),
            iteration: 0,
        })
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Number of transitions performed so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Runs `n_iterations` transitions, recording every visited state and every
    /// acceptance probability.
    pub fn run(&mut self, n_iterations: usize) -> ChainOutput<T> {
        crate::core::run_chain(self, n_iterations)
    }
}

impl<T, G, S> MarkovChain<T> for HMCMarkovChain<T, G, S>
where
    T: Float + SampleUniform,
    G: GradientTarget<T>,
    S: StepSchedule<T>,
    StandardNormal: Distribution<T>,
{
    fn step(&mut self) -> StepInfo<T> {
        let (step_size, n_leapfrog) = self.schedule.draw(self.iteration, &mut self.rng);
        let t = transition(
            self.target.as_ref(),
            &self.current_state,
            step_size,
            n_leapfrog,
            &self.mass,
            &mut self.rng,
        );
        self.iteration += 1;
        self.current_state = t.position;
        StepInfo {
            accept_prob: t.accept_prob,
            accepted: t.accepted,
            divergent: t.divergent,
        }
    }

    fn current_state(&self) -> &[T] {
        &self.current_state
    }
}

/**
Multi-chain HMC sampler.

Holds one [`HMCMarkovChain`] per starting point. Chains share the target through an
[`Arc`] and nothing else; each has its own state and random stream, so they can run
on separate threads without locking. [`HMC::set_seed`] seeds chain `i` with
`seed + i`, which makes runs reproducible bit for bit.

Sampling goes through [`crate::core::ChainRunner::run`] (or `run_progress`), which
returns all draws as a `[iterations, chains, d]` array together with the acceptance
trace.
*/
#[derive(Debug, Clone)]
pub struct HMC<T: Float, G, S> {
    pub target: Arc<G>,
    pub mass: DiagonalMass<T>,
    /// The vector of independent Markov chains.
    pub chains: Vec<HMCMarkovChain<T, G, S>>,
    /// The global random seed.
    pub seed: u64,
}

impl<T, G, S> HMC<T, G, S>
where
    T: Float + SampleUniform,
    G: GradientTarget<T>,
    S: StepSchedule<T> + Clone,
    StandardNormal: Distribution<T>,
{
    /// Builds one chain per row of `initial_positions`, with a unit mass matrix.
    ///
    /// Fails before any sampling if there are no chains, the rows have different or
    /// zero lengths, a starting value is not finite, or the schedule is invalid.
    /// An infeasible start (log-density of negative infinity) is allowed; the chain
    /// simply rejects until a proposal lands inside the support.
    pub fn new(
        target: G,
        initial_positions: Vec<Vec<T>>,
        schedule: S,
    ) -> Result<Self, ConfigError> {
        schedule.validate()?;
        let dim = initial_positions
            .first()
            .map(Vec::len)
            .ok_or(ConfigError::NoChains)?;
        if dim == 0 {
            return Err(ConfigError::EmptyParameters);
        }
        for (chain, row) in initial_positions.iter().enumerate() {
            if row.len() != dim {
                return Err(ConfigError::DimensionMismatch {
                    chain,
                    expected: dim,
                    found: row.len(),
                });
            }
        }

        let target = Arc::new(target);
        let mass = DiagonalMass::unit(dim);
        let chains = initial_positions
            .iter()
            .enumerate()
            .map(|(chain, row)| {
                HMCMarkovChain::new(target.clone(), schedule.clone(), mass.clone(), row)
                    .map_err(|err| err.for_chain(chain))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let seed = thread_rng().gen::<u64>();

        Ok(Self {
            target,
            mass,
            chains,
            seed,
        })
    }

    /// Replaces the unit mass matrix by `diag(mass)` in every chain.
    pub fn with_mass(mut self, mass: Vec<T>) -> Result<Self, ConfigError> {
        let mass = DiagonalMass::new(mass)?;
        if mass.dim() != self.mass.dim() {
            return Err(ConfigError::MassDimensionMismatch {
                expected: self.mass.dim(),
                found: mass.dim(),
            });
        }
        for chain in self.chains.iter_mut() {
            chain.mass = mass.clone();
        }
        self.mass = mass;
        Ok(self)
    }

    /**
    Sets a new global seed and updates the seed for each chain accordingly.

    Each chain receives a unique seed calculated as `seed + i`, where `i` is the chain index.
    */
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        for (i, chain) in self.chains.iter_mut().enumerate() {
            let chain_seed = seed.wrapping_add(i as u64);
            chain.seed = chain_seed;
            chain.rng = SmallRng::seed_from_u64(chain_seed);
        }
        self
    }

    pub fn dim(&self) -> usize {
        self.mass.dim()
    }
}

impl<T, G, S> HasChains<T> for HMC<T, G, S>
where
    T: Float + SampleUniform + Send + Sync,
    G: GradientTarget<T> + Send + Sync,
    S: StepSchedule<T>,
    StandardNormal: Distribution<T>,
{
    type Chain = HMCMarkovChain<T, G, S>;

    fn chains_mut(&mut self) -> &mut Vec<Self::Chain> {
        &mut self.chains
    }
}
