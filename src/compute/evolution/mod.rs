//! Evolutionary search over the two green durations.
//!
//! # Overview
//!
//! - **Genome Operations** (`genome`): random plans, crossover, mutation
//! - **Strategies** (`strategy`): how a child is varied from two elites
//! - **Search** (`search`): generational loop with elitism
//!
//! Every generation evaluates the whole population sequentially, sorts it by
//! fitness (stable, descending), copies the top `elite_count` unchanged to the
//! front of the next population and fills the rest with children of two
//! distinct elites.
//!
//! # Example
//!
//! ```rust,no_run
//! use signal_tuner::compute::Evaluator;
//! use signal_tuner::compute::evolution::EvolutionEngine;
//! use signal_tuner::schema::TuningConfig;
//! use signal_tuner::sim::launcher_for;
//!
//! let config = TuningConfig::default();
//! let mut evaluator = Evaluator::new(&config, launcher_for(config.scenario.backend))?;
//! let mut engine = EvolutionEngine::new(config)?;
//! let result = engine.run_with_callback(&mut evaluator, |report| {
//!     println!("Generation {}: best fitness = {:.3}",
//!         report.generation, report.record.fitness);
//!     Ok(())
//! })?;
//! println!("Best plan {} fitness {:.3}", result.best, result.best_fitness);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Strategies
//!
//! - `Gaussian`: gene-swap crossover, each gene perturbed with probability
//!   `mutation_rate` by N(0, `mutation_std`)
//! - `RandomReset`: single-point crossover, `mutation_percent_genes` of the
//!   genes redrawn uniformly in bounds

mod genome;
mod search;
mod strategy;

pub use genome::GenomeRng;
pub use search::{
    EvolutionEngine, GenerationReport, ScoredCandidate, SearchError, SearchHistory, SearchResult,
    SearchState, SearchStats,
};
pub use strategy::{GaussianVariation, RandomResetVariation, Variation, variation_for};
