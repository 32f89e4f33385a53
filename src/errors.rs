//! Configuration errors surfaced before any chain starts.
//!
//! Numeric trouble during sampling (infeasible regions, divergent trajectories,
//! NaN acceptance ratios) is never reported through this type; it is folded into
//! ordinary rejections inside [`crate::hmc::transition`].

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("at least one chain is required")]
    NoChains,

    #[error("parameter vectors must have at least one dimension")]
    EmptyParameters,

    #[error("starting point of chain {chain} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        chain: usize,
        expected: usize,
        found: usize,
    },

    #[error("starting point of chain {chain} has a non-finite value at index {index}")]
    NonFiniteStart { chain: usize, index: usize },

    #[error("mass vector entries must be positive and finite, entry {index} is {value}")]
    InvalidMass { index: usize, value: f64 },

    #[error("mass vector has dimension {found}, expected {expected}")]
    MassDimensionMismatch { expected: usize, found: usize },

    #[error("step size must be positive and finite, got {0}")]
    InvalidStepSize(f64),

    #[error("number of leapfrog steps must be at least 1")]
    ZeroLeapfrogSteps,

    #[error("finite-difference epsilon must be positive and finite, got {0}")]
    InvalidEpsilon(f64),

    #[error("{what} have different lengths: {left} and {right}")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    #[error("design matrix has {rows} rows but the response has {responses} entries")]
    DataShapeMismatch { rows: usize, responses: usize },

    #[error("warmup iterations ({warmup}) exceed total iterations ({total})")]
    WarmupExceedsTotal { warmup: usize, total: usize },
}

impl ConfigError {
    /// Attributes a per-chain error to chain `chain`. Other errors pass through.
    pub fn for_chain(self, chain: usize) -> Self {
        match self {
            ConfigError::NonFiniteStart { index, .. } => {
                ConfigError::NonFiniteStart { chain, index }
            }
            ConfigError::DimensionMismatch {
                expected, found, ..
            } => ConfigError::DimensionMismatch {
                chain,
                expected,
                found,
            },
            other => other,
        }
    }
}
