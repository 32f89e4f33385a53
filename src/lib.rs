pub mod core;
pub mod distributions;
pub mod errors;
pub mod gradient;
pub mod hmc;
pub mod leapfrog;
pub mod mass;
pub mod stats;
pub mod tuning;
