//! Schema module - Configuration and data-model types for signal-plan tuning.

mod config;
mod plan;
mod records;

pub use config::*;
pub use plan::*;
pub use records::*;
