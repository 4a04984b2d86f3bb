//! Generational search with elitism over two-gene timing plans.

use std::time::Instant;

use crate::compute::evaluator::{CandidateEvaluator, EvaluationError};
use crate::history::HistoryError;
use crate::schema::{Candidate, ConfigError, GenerationRecord, GreenBounds, Metrics, TuningConfig};

use super::genome::GenomeRng;
use super::strategy::{Variation, variation_for};

/// An evaluated member of the population.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub metrics: Metrics,
    pub fitness: f64,
}

/// Engine state between generations.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    /// Population for the next evaluation round.
    pub population: Vec<Candidate>,
    /// Generations completed.
    pub generation: usize,
    /// Best candidate seen so far.
    pub best: Option<ScoredCandidate>,
}

/// Per-generation fitness series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHistory {
    pub best_fitness: Vec<f64>,
    pub avg_fitness: Vec<f64>,
    /// Running best, non-decreasing.
    pub best_so_far: Vec<f64>,
}

/// Handed to the per-generation callback once a generation is complete.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// Generations completed (1-based).
    pub generation: usize,
    /// Row describing the generation's best candidate.
    pub record: GenerationRecord,
    /// Evaluated population, best first.
    pub scored: Vec<ScoredCandidate>,
    /// Population bred for the next generation, elites first.
    pub next_population: Vec<Candidate>,
    pub best_so_far: ScoredCandidate,
}

impl GenerationReport {
    /// Elites of this generation.
    pub fn elites(&self, elite_count: usize) -> &[ScoredCandidate] {
        &self.scored[..elite_count.min(self.scored.len())]
    }
}

/// Summary statistics of a finished search.
#[derive(Debug, Clone)]
pub struct SearchStats {
    pub generations: usize,
    pub total_evaluations: u64,
    pub elapsed_seconds: f64,
}

/// Outcome of a search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub best: Candidate,
    pub best_fitness: f64,
    pub best_metrics: Metrics,
    pub history: SearchHistory,
    pub state: SearchState,
    pub stats: SearchStats,
}

/// Search errors. Any of them aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("Search finished without evaluating any candidate")]
    NoEvaluations,
}

/// Evolution engine that runs the search.
pub struct EvolutionEngine {
    config: TuningConfig,
    bounds: GreenBounds,
    rng: GenomeRng,
    variation: Box<dyn Variation>,
    state: SearchState,
    history: SearchHistory,
    evaluations: u64,
}

impl EvolutionEngine {
    /// Create a new evolution engine from a config.
    pub fn new(config: TuningConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let seed = config.random_seed.unwrap_or_else(rand::random);
        log::debug!("search seed {}", seed);

        Ok(Self {
            bounds: config.bounds(),
            rng: GenomeRng::new(seed),
            variation: variation_for(&config.strategy, config.mutation_std),
            config,
            state: SearchState::default(),
            history: SearchHistory::default(),
            evaluations: 0,
        })
    }

    /// Replace the variation operator.
    pub fn with_variation(mut self, variation: Box<dyn Variation>) -> Self {
        self.variation = variation;
        self
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn history(&self) -> &SearchHistory {
        &self.history
    }

    /// Fill the population uniformly within bounds.
    pub fn initialize(&mut self) {
        self.state = SearchState::default();
        self.history = SearchHistory::default();
        self.evaluations = 0;
        self.state.population = (0..self.config.population_size)
            .map(|_| self.rng.random_candidate(&self.bounds))
            .collect();
    }

    /// Evaluate the current population in order, best first on return.
    fn evaluate_population<E>(
        &mut self,
        evaluator: &mut E,
    ) -> Result<Vec<ScoredCandidate>, SearchError>
    where
        E: CandidateEvaluator + ?Sized,
    {
        let mut scored = Vec::with_capacity(self.state.population.len());
        for &candidate in &self.state.population {
            let evaluation = evaluator.evaluate(candidate)?;
            self.evaluations += 1;
            scored.push(ScoredCandidate {
                candidate,
                metrics: evaluation.metrics,
                fitness: evaluation.fitness,
            });
        }

        // Stable: ties keep evaluation order.
        scored.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
        Ok(scored)
    }

    /// Elites first, then children of two distinct elites.
    fn breed(&mut self, scored: &[ScoredCandidate]) -> Vec<Candidate> {
        let elite_count = self.config.elite_count.min(scored.len());
        let elites: Vec<Candidate> = scored[..elite_count].iter().map(|s| s.candidate).collect();

        let mut next = Vec::with_capacity(self.config.population_size);
        next.extend_from_slice(&elites);

        while next.len() < self.config.population_size {
            let Some((a, b)) = self.rng.pick_parents(&elites) else {
                next.push(self.rng.random_candidate(&self.bounds));
                continue;
            };
            next.push(self.variation.breed(&mut self.rng, a, b, &self.bounds));
        }
        next
    }

    /// Evaluate, rank, record and breed one generation.
    fn step_generation<E>(&mut self, evaluator: &mut E) -> Result<GenerationReport, SearchError>
    where
        E: CandidateEvaluator + ?Sized,
    {
        let scored = self.evaluate_population(evaluator)?;
        let generation_best = scored.first().cloned().ok_or(SearchError::NoEvaluations)?;
        let generation = self.state.generation + 1;

        let improved = self
            .state
            .best
            .as_ref()
            .is_none_or(|best| generation_best.fitness > best.fitness);
        if improved {
            self.state.best = Some(generation_best.clone());
        }
        let best_so_far = self
            .state
            .best
            .clone()
            .unwrap_or_else(|| generation_best.clone());

        let avg_fitness = scored.iter().map(|s| s.fitness).sum::<f64>() / scored.len() as f64;
        self.history.best_fitness.push(generation_best.fitness);
        self.history.avg_fitness.push(avg_fitness);
        self.history.best_so_far.push(best_so_far.fitness);

        log::info!(
            "generation {}/{} best {} fitness {:.3} (avg {:.3}, best so far {} {:.3})",
            generation,
            self.config.generations,
            generation_best.candidate,
            generation_best.fitness,
            avg_fitness,
            best_so_far.candidate,
            best_so_far.fitness
        );

        let next_population = self.breed(&scored);
        self.state.population = next_population.clone();
        self.state.generation = generation;

        Ok(GenerationReport {
            generation,
            record: GenerationRecord::from_metrics(
                generation,
                generation_best.fitness,
                &generation_best.metrics,
            ),
            scored,
            next_population,
            best_so_far,
        })
    }

    /// Run the search, calling `callback` after every generation.
    ///
    /// A callback error aborts the search.
    pub fn run_with_callback<E, F>(
        &mut self,
        evaluator: &mut E,
        mut callback: F,
    ) -> Result<SearchResult, SearchError>
    where
        E: CandidateEvaluator + ?Sized,
        F: FnMut(&GenerationReport) -> Result<(), SearchError>,
    {
        let start_time = Instant::now();
        log::info!(
            "searching {} generations of {} ({} elites, {} variation)",
            self.config.generations,
            self.config.population_size,
            self.config.elite_count,
            self.variation.name()
        );

        self.initialize();
        for _ in 0..self.config.generations {
            let report = self.step_generation(evaluator)?;
            callback(&report)?;
        }

        let best = self.state.best.clone().ok_or(SearchError::NoEvaluations)?;
        log::info!(
            "overall best {} fitness {:.3} (arrived {}, wait {:.1})",
            best.candidate,
            best.fitness,
            best.metrics.arrived_total,
            best.metrics.total_wait
        );

        Ok(SearchResult {
            best: best.candidate,
            best_fitness: best.fitness,
            best_metrics: best.metrics,
            history: self.history.clone(),
            state: self.state.clone(),
            stats: SearchStats {
                generations: self.state.generation,
                total_evaluations: self.evaluations,
                elapsed_seconds: start_time.elapsed().as_secs_f64(),
            },
        })
    }

    /// Run the search (blocking).
    pub fn run<E>(&mut self, evaluator: &mut E) -> Result<SearchResult, SearchError>
    where
        E: CandidateEvaluator + ?Sized,
    {
        self.run_with_callback(evaluator, |_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evaluator::Evaluation;
    use crate::schema::SearchStrategy;
    use crate::sim::SimError;

    fn metrics_for(c: Candidate) -> Metrics {
        Metrics {
            green_a: c.green_a,
            green_b: c.green_b,
            steps_used: 1,
            arrived_total: 0,
            total_wait: 0.0,
            avg_speed: 0.0,
        }
    }

    /// Peak at (50, 30).
    fn objective(c: Candidate) -> Result<Evaluation, EvaluationError> {
        let da = (c.green_a - 50) as f64;
        let db = (c.green_b - 30) as f64;
        Ok(Evaluation {
            metrics: metrics_for(c),
            fitness: -(da * da) - db * db,
        })
    }

    fn config(seed: u64) -> TuningConfig {
        TuningConfig {
            random_seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_population_size_and_generations() {
        let mut engine = EvolutionEngine::new(config(1)).unwrap();
        let mut calls = 0;
        let mut counting = |c: Candidate| {
            calls += 1;
            objective(c)
        };

        let result = engine.run(&mut counting).unwrap();

        assert_eq!(calls, 12 * 10);
        assert_eq!(result.stats.generations, 10);
        assert_eq!(result.stats.total_evaluations, 120);
        assert_eq!(result.history.best_fitness.len(), 10);
        assert_eq!(result.state.population.len(), 12);
    }

    #[test]
    fn test_best_so_far_monotonic() {
        for strategy in [
            SearchStrategy::default(),
            SearchStrategy::RandomReset {
                mutation_percent_genes: 50.0,
            },
        ] {
            let mut engine = EvolutionEngine::new(TuningConfig {
                strategy,
                ..config(7)
            })
            .unwrap();
            let result = engine.run(&mut objective).unwrap();

            let series = &result.history.best_so_far;
            assert!(series.windows(2).all(|w| w[1] >= w[0]));
            assert_eq!(*series.last().unwrap(), result.best_fitness);
            let max_gen_best = result
                .history
                .best_fitness
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(result.best_fitness, max_gen_best);
        }
    }

    #[test]
    fn test_elites_lead_next_population() {
        let mut engine = EvolutionEngine::new(config(3)).unwrap();
        let mut reports = Vec::new();

        engine
            .run_with_callback(&mut objective, |report| {
                reports.push(report.clone());
                Ok(())
            })
            .unwrap();

        for report in &reports {
            let elites: Vec<Candidate> = report.elites(4).iter().map(|s| s.candidate).collect();
            assert_eq!(&report.next_population[..4], &elites[..]);
            assert_eq!(report.next_population.len(), 12);
        }
        for pair in reports.windows(2) {
            let evaluated: Vec<Candidate> = pair[1].scored.iter().map(|s| s.candidate).collect();
            for elite in &pair[0].next_population[..4] {
                assert!(evaluated.contains(elite));
            }
        }
    }

    #[test]
    fn test_candidates_stay_in_bounds() {
        let mut engine = EvolutionEngine::new(TuningConfig {
            mutation_std: 500.0,
            ..config(11)
        })
        .unwrap();
        let bounds = GreenBounds::new(10, 80);
        let mut checked = |c: Candidate| {
            assert!(bounds.contains(c.green_a) && bounds.contains(c.green_b));
            objective(c)
        };

        engine.run(&mut checked).unwrap();
    }

    #[test]
    fn test_seed_reproducible() {
        let first = EvolutionEngine::new(config(99))
            .unwrap()
            .run(&mut objective)
            .unwrap();
        let second = EvolutionEngine::new(config(99))
            .unwrap()
            .run(&mut objective)
            .unwrap();

        assert_eq!(first.best, second.best);
        assert_eq!(first.history, second.history);
        assert_eq!(first.state.population, second.state.population);
    }

    #[test]
    fn test_ties_keep_first_evaluated() {
        let mut engine = EvolutionEngine::new(TuningConfig {
            generations: 1,
            ..config(5)
        })
        .unwrap();
        let mut flat = |c: Candidate| -> Result<Evaluation, EvaluationError> {
            Ok(Evaluation {
                metrics: metrics_for(c),
                fitness: 1.0,
            })
        };
        let initial: Vec<Candidate> = {
            let mut seeded = EvolutionEngine::new(TuningConfig {
                generations: 1,
                ..config(5)
            })
            .unwrap();
            seeded.initialize();
            seeded.state().population.clone()
        };

        let result = engine.run(&mut flat).unwrap();
        assert_eq!(result.best, initial[0]);
        assert_eq!(&result.state.population[..4], &initial[..4]);
    }

    #[test]
    fn test_evaluation_error_aborts() {
        let mut engine = EvolutionEngine::new(config(2)).unwrap();
        let mut calls = 0;
        let mut failing = |c: Candidate| {
            calls += 1;
            if calls == 5 {
                return Err(EvaluationError::Sim(SimError::Closed));
            }
            objective(c)
        };

        let err = engine.run(&mut failing).unwrap_err();
        assert!(matches!(
            err,
            SearchError::Evaluation(EvaluationError::Sim(SimError::Closed))
        ));
        assert_eq!(calls, 5);
    }

    #[test]
    fn test_callback_error_aborts() {
        let mut engine = EvolutionEngine::new(config(2)).unwrap();
        let mut generations = 0;

        let err = engine
            .run_with_callback(&mut objective, |_| {
                generations += 1;
                Err(SearchError::NoEvaluations)
            })
            .unwrap_err();

        assert!(matches!(err, SearchError::NoEvaluations));
        assert_eq!(generations, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = EvolutionEngine::new(TuningConfig {
            elite_count: 1,
            ..Default::default()
        });
        assert!(matches!(result, Err(SearchError::Config(_))));
    }
}
