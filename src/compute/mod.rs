//! Compute module - plan installation, scoring and search.

mod evaluator;
mod metrics;
mod signal;

pub mod evolution;

pub use evaluator::*;
pub use metrics::*;
pub use signal::*;
