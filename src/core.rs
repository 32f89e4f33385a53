use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView3, Axis};
use num_traits::Float;
use rayon::prelude::*;

use crate::errors::ConfigError;
use crate::stats::{AcceptanceTracker, RunStats};

/// What happened during one iteration of a chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo<T> {
    /// Metropolis acceptance probability, always in `[0, 1]`.
    pub accept_prob: T,
    pub accepted: bool,
    pub divergent: bool,
}

pub trait MarkovChain<T> {
    /// Does one iteration of the chain and reports its acceptance bookkeeping.
    /// The new state is available through [`MarkovChain::current_state`].
    fn step(&mut self) -> StepInfo<T>;

    /// Gets the current state without stepping.
    fn current_state(&self) -> &[T];
}

/// Every state visited by one chain, plus its acceptance trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput<T> {
    /// `[iterations, d]`
    pub draws: Array2<T>,
    /// `[iterations]`
    pub accept_probs: Array1<T>,
    pub divergences: usize,
}

pub fn run_chain<T, M>(chain: &mut M, n_steps: usize) -> ChainOutput<T>
where
    M: MarkovChain<T>,
    T: Float,
{
    let dim = chain.current_state().len();
    let mut draws = Array2::<T>::zeros((n_steps, dim));
    let mut accept_probs = Array1::<T>::zeros(n_steps);
    let mut divergences = 0;

    for i in 0..n_steps {
        let info = chain.step();
        draws
            .row_mut(i)
            .assign(&ArrayView1::from(chain.current_state()));
        accept_probs[i] = info.accept_prob;
        divergences += info.divergent as usize;
    }

    ChainOutput {
        draws,
        accept_probs,
        divergences,
    }
}

pub fn run_chain_with_progress<T, M>(
    chain: &mut M,
    n_steps: usize,
    pb: &ProgressBar,
) -> ChainOutput<T>
where
    M: MarkovChain<T>,
    T: Float,
{
    let dim = chain.current_state().len();
    let mut draws = Array2::<T>::zeros((n_steps, dim));
    let mut accept_probs = Array1::<T>::zeros(n_steps);
    let mut divergences = 0;
    let mut tracker = AcceptanceTracker::new(100);

    pb.set_length(n_steps as u64);

    for i in 0..n_steps {
        let info = chain.step();
        draws
            .row_mut(i)
            .assign(&ArrayView1::from(chain.current_state()));
        accept_probs[i] = info.accept_prob;
        divergences += info.divergent as usize;

        tracker.step(info.accept_prob.to_f64().unwrap_or(0.0));
        pb.set_message(format!(
            "p(accept)≈{:.2} divergences={}",
            tracker.p_accept(),
            divergences
        ));
        pb.inc(1);
    }

    ChainOutput {
        draws,
        accept_probs,
        divergences,
    }
}

/// Draws and acceptance traces of a multi-chain run.
///
/// Warmup iterations are kept; [`Sample::post_warmup`] and [`Sample::stats`] skip them.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    /// `[iterations, chains, d]`
    pub draws: Array3<T>,
    /// `[iterations, chains]`
    pub accept_probs: Array2<T>,
    /// Divergent transitions per chain.
    pub divergences: Vec<usize>,
    pub n_warmup: usize,
}

impl<T: Float> Sample<T> {
    /// Stacks per-chain outputs along the chain axis.
    pub fn from_chains(outputs: Vec<ChainOutput<T>>, n_warmup: usize) -> Self {
        let n_chains = outputs.len();
        let (n_iterations, dim) = outputs
            .first()
            .map(|out| out.draws.dim())
            .unwrap_or((0, 0));

        let mut draws = Array3::<T>::zeros((n_iterations, n_chains, dim));
        let mut accept_probs = Array2::<T>::zeros((n_iterations, n_chains));
        let mut divergences = Vec::with_capacity(n_chains);
        for (c, out) in outputs.into_iter().enumerate() {
            draws.index_axis_mut(Axis(1), c).assign(&out.draws);
            accept_probs.column_mut(c).assign(&out.accept_probs);
            divergences.push(out.divergences);
        }

        Self {
            draws,
            accept_probs,
            divergences,
            n_warmup,
        }
    }

    pub fn n_iterations(&self) -> usize {
        self.draws.shape()[0]
    }

    pub fn n_chains(&self) -> usize {
        self.draws.shape()[1]
    }

    pub fn dim(&self) -> usize {
        self.draws.shape()[2]
    }

    /// Draws with the warmup prefix removed, `[iterations - warmup, chains, d]`.
    pub fn post_warmup(&self) -> ArrayView3<'_, T> {
        self.draws.slice(s![self.n_warmup.., .., ..])
    }

    pub fn stats(&self) -> RunStats {
        RunStats::from_trace(
            self.accept_probs.view(),
            self.n_warmup,
            self.divergences.clone(),
        )
    }
}

/// A trait for "anything that owns multiple MarkovChains".
/// - `T` is the state element type (e.g. f64).
/// - `Chain` is the MarkovChain type stored by this struct.
pub trait HasChains<T> {
    type Chain: MarkovChain<T> + std::marker::Send;

    /// Returns a mutable reference to the vector of chains.
    fn chains_mut(&mut self) -> &mut Vec<Self::Chain>;
}

fn check_run(n_chains: usize, n_iterations: usize, n_warmup: usize) -> Result<(), ConfigError> {
    if n_chains == 0 {
        return Err(ConfigError::NoChains);
    }
    if n_warmup > n_iterations {
        return Err(ConfigError::WarmupExceedsTotal {
            warmup: n_warmup,
            total: n_iterations,
        });
    }
    Ok(())
}

pub trait ChainRunner<T>: HasChains<T>
where
    T: Float + std::marker::Send + std::marker::Sync + 'static,
{
    /// Runs every chain for `n_iterations` on rayon's pool.
    ///
    /// The first `n_warmup` iterations are kept in the output but excluded from
    /// the summary returned by [`Sample::stats`].
    fn run(&mut self, n_iterations: usize, n_warmup: usize) -> Result<Sample<T>, ConfigError> {
        check_run(self.chains_mut().len(), n_iterations, n_warmup)?;

        let outputs: Vec<ChainOutput<T>> = self
            .chains_mut()
            .par_iter_mut()
            .map(|chain| run_chain(chain, n_iterations))
            .collect();

        Ok(Sample::from_chains(outputs, n_warmup))
    }

    /// Like [`ChainRunner::run`], with one progress bar per chain showing a sliding
    /// acceptance estimate and, when done, the chain's mean post-warmup acceptance.
    fn run_progress(
        &mut self,
        n_iterations: usize,
        n_warmup: usize,
    ) -> Result<Sample<T>, ConfigError> {
        check_run(self.chains_mut().len(), n_iterations, n_warmup)?;

        let multi = MultiProgress::new();
        let pb_style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("progress bar template is valid")
            .progress_chars("##-");

        let outputs: Vec<ChainOutput<T>> = self
            .chains_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(i, chain)| {
                let pb = multi.add(ProgressBar::new(n_iterations as u64));
                pb.set_prefix(format!("Chain {i}"));
                pb.set_style(pb_style.clone());

                let out = run_chain_with_progress(chain, n_iterations, &pb);

                let post = out.accept_probs.slice(s![n_warmup..]);
                let mean_accept = post
                    .mapv(|p| p.to_f64().unwrap_or(0.0))
                    .mean()
                    .unwrap_or(f64::NAN);
                pb.finish_with_message(format!(
                    "Done! mean p(accept)={:.3} divergences={}",
                    mean_accept, out.divergences
                ));
                out
            })
            .collect();

        Ok(Sample::from_chains(outputs, n_warmup))
    }
}

impl<T, R> ChainRunner<T> for R
where
    T: Float + std::marker::Send + std::marker::Sync + 'static,
    R: HasChains<T>,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    /// Walks +1 on every step, accepting on even iterations.
    struct Counter {
        state: Vec<f64>,
        i: usize,
    }

    impl MarkovChain<f64> for Counter {
        fn step(&mut self) -> StepInfo<f64> {
            self.i += 1;
            let accepted = self.i % 2 == 0;
            if accepted {
                self.state.iter_mut().for_each(|x| *x += 1.0);
            }
            StepInfo {
                accept_prob: if accepted { 1.0 } else { 0.0 },
                accepted,
                divergent: !accepted && self.i == 3,
            }
        }

        fn current_state(&self) -> &[f64] {
            &self.state
        }
    }

    struct Counters {
        chains: Vec<Counter>,
    }

    impl HasChains<f64> for Counters {
        type Chain = Counter;

        fn chains_mut(&mut self) -> &mut Vec<Counter> {
            &mut self.chains
        }
    }

    fn counters(n: usize) -> Counters {
        Counters {
            chains: (0..n)
                .map(|c| Counter {
                    state: vec![c as f64, -(c as f64)],
                    i: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn run_chain_records_every_iteration() {
        let mut chain = Counter {
            state: vec![0.0],
            i: 0,
        };
        let out = run_chain(&mut chain, 4);
        assert_eq!(out.draws, arr2(&[[0.0], [1.0], [1.0], [2.0]]));
        assert_eq!(out.accept_probs.to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
        assert_eq!(out.divergences, 1);
    }

    #[test]
    fn run_assembles_iteration_chain_dim_layout() {
        let sample = counters(3).run(4, 1).unwrap();
        assert_eq!(sample.draws.shape(), &[4, 3, 2]);
        assert_eq!(sample.accept_probs.shape(), &[4, 3]);
        assert_eq!(sample.divergences, vec![1, 1, 1]);
        // chain 2 starts at (2, -2) and moves on iterations 1 and 3
        assert_eq!(sample.draws[[3, 2, 0]], 4.0);
        assert_eq!(sample.draws[[3, 2, 1]], 0.0);
        assert_eq!(sample.post_warmup().shape(), &[3, 3, 2]);
        let stats = sample.stats();
        assert!((stats.mean_accept[0] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn progress_run_matches_plain_run() {
        let plain = counters(2).run(6, 2).unwrap();
        let progress = counters(2).run_progress(6, 2).unwrap();
        assert_eq!(plain, progress);
    }

    #[test]
    fn rejects_warmup_longer_than_run() {
        assert_eq!(
            counters(1).run(5, 6).unwrap_err(),
            ConfigError::WarmupExceedsTotal {
                warmup: 6,
                total: 5
            }
        );
        assert_eq!(counters(0).run(5, 0).unwrap_err(), ConfigError::NoChains);
    }

    #[test]
    fn empty_output_has_zero_shape() {
        let sample = Sample::<f64>::from_chains(vec![], 0);
        assert_eq!(sample.draws.shape(), &[0, 0, 0]);
        assert_eq!(sample.n_chains(), 0);
    }
}
