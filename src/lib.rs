//! Signal Tuner - Evolutionary green-phase tuning for a signalized intersection.
//!
//! This crate searches the two green durations of a four-phase traffic-light
//! program (green A, yellow, green B, yellow) by running a traffic simulation
//! for every candidate plan and scoring throughput against accumulated waiting
//! time.
//!
//! # Architecture
//!
//! - `schema`: Configuration and data-model types
//! - `sim`: Simulator seam, session guard, SUMO/TraCI and built-in backends
//! - `compute`: Plan installation, metrics, fitness, evaluator and search
//! - `history`: Append-only per-generation CSV log
//!
//! # Example
//!
//! ```rust,no_run
//! use signal_tuner::{
//!     compute::{CandidateEvaluator, Evaluator},
//!     schema::{Candidate, TuningConfig},
//!     sim::launcher_for,
//! };
//!
//! let config = TuningConfig::default();
//! let mut evaluator = Evaluator::new(&config, launcher_for(config.scenario.backend))?;
//!
//! let evaluation = evaluator.evaluate(Candidate::new(40, 35))?;
//! println!(
//!     "arrived {} wait {:.1} fitness {:.3}",
//!     evaluation.metrics.arrived_total, evaluation.metrics.total_wait, evaluation.fitness
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compute;
pub mod history;
pub mod schema;
pub mod sim;

// Re-export commonly used types
pub use compute::evolution::{EvolutionEngine, SearchResult};
pub use compute::{CandidateEvaluator, Evaluation, Evaluator};
pub use history::HistoryRecorder;
pub use schema::{Candidate, Metrics, TuningConfig};
