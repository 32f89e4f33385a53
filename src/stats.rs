//! Acceptance-rate summaries for tuning guidance.

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use num_traits::Float;
use std::collections::VecDeque;

/// Sliding-window estimate of a chain's acceptance probability, used for progress
/// messages while a chain is running.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptanceTracker {
    window: VecDeque<f64>,
    capacity: usize,
    window_sum: f64,
    n: u64,
}

impl AcceptanceTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            window_sum: 0.0,
            n: 0,
        }
    }

    pub fn step(&mut self, accept_prob: f64) {
        self.n += 1;
        self.window.push_back(accept_prob);
        self.window_sum += accept_prob;
        if self.window.len() > self.capacity {
            if let Some(removed) = self.window.pop_front() {
                self.window_sum -= removed;
            }
        }
    }

    /// Mean acceptance probability over the last `capacity` iterations.
    pub fn p_accept(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.window_sum / self.window.len() as f64
        }
    }

    pub fn n(&self) -> u64 {
        self.n
    }
}

/// Per-chain summary of a finished run. Warmup iterations are excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    /// Mean post-warmup acceptance probability, one entry per chain.
    pub mean_accept: Array1<f64>,
    /// Number of divergent transitions per chain, warmup included.
    pub divergences: Vec<usize>,
    pub n_warmup: usize,
    pub n_iterations: usize,
}

impl RunStats {
    /// Summarizes an `[iterations, chains]` acceptance trace.
    ///
    /// A chain with no post-warmup iterations gets a mean acceptance of NaN.
    pub fn from_trace<T: Float>(
        accept_probs: ArrayView2<T>,
        n_warmup: usize,
        divergences: Vec<usize>,
    ) -> Self {
        let n_iterations = accept_probs.nrows();
        let kept = accept_probs.slice(s![n_warmup.min(n_iterations).., ..]);
        let mean_accept = kept
            .mapv(|p| p.to_f64().unwrap_or(f64::NAN))
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::from_elem(accept_probs.ncols(), f64::NAN));
        Self {
            mean_accept,
            divergences,
            n_warmup,
            n_iterations,
        }
    }

    /// Smallest per-chain mean acceptance, the chain most in need of a smaller step.
    ///
    /// `None` when there are no chains or no post-warmup iterations.
    pub fn min_mean_accept(&self) -> Option<f64> {
        self.mean_accept.min().ok().copied()
    }

    pub fn total_divergences(&self) -> usize {
        self.divergences.iter().sum()
    }
}
