//! Runs one full simulation for a candidate plan and scores it.

use crate::schema::{Candidate, ConfigError, Metrics, TuningConfig};
use crate::sim::{LaunchOptions, Launcher, Session, SimError};

use super::metrics::{Fitness, MetricsCollector};
use super::signal::{SignalPlanController, SignalPlanError};

/// Steps between verbose progress lines.
pub const HEARTBEAT_INTERVAL: u64 = 500;

/// Log target of the verbose progress lines.
pub const PROGRESS_TARGET: &str = "signal_tuner::progress";

/// Metrics and score of one evaluated candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub metrics: Metrics,
    pub fitness: f64,
}

/// Errors while evaluating a candidate. All of them abort the search.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error(transparent)]
    SignalPlan(#[from] SignalPlanError),
}

/// Anything that can turn a candidate into an [`Evaluation`].
///
/// Implemented by [`Evaluator`] and by any
/// `FnMut(Candidate) -> Result<Evaluation, EvaluationError>`.
pub trait CandidateEvaluator {
    fn evaluate(&mut self, candidate: Candidate) -> Result<Evaluation, EvaluationError>;
}

impl<F> CandidateEvaluator for F
where
    F: FnMut(Candidate) -> Result<Evaluation, EvaluationError>,
{
    fn evaluate(&mut self, candidate: Candidate) -> Result<Evaluation, EvaluationError> {
        self(candidate)
    }
}

/// Simulation-backed evaluator. Each call opens a fresh session.
pub struct Evaluator {
    launcher: Box<dyn Launcher>,
    options: LaunchOptions,
    controller: SignalPlanController,
    fitness: Fitness,
    horizon: u64,
    stop_speed: f64,
    verbose: bool,
}

impl Evaluator {
    /// Build from a validated config.
    ///
    /// Fails if the simulator configuration file is missing, so a run never
    /// starts against a scenario that cannot load.
    pub fn new(config: &TuningConfig, launcher: Box<dyn Launcher>) -> Result<Self, EvaluationError> {
        config.validate()?;
        let options = LaunchOptions::from_scenario(&config.scenario);
        if !options.config_path.is_file() {
            return Err(SimError::MissingConfig(options.config_path).into());
        }

        Ok(Self {
            launcher,
            options,
            controller: SignalPlanController::from_config(config),
            fitness: Fitness::new(config.alpha),
            horizon: config.horizon,
            stop_speed: config.scenario.stop_speed,
            verbose: false,
        })
    }

    /// Start the visual front end for each run.
    pub fn with_gui(mut self, gui: bool) -> Self {
        self.options.gui = gui;
        self
    }

    /// Log a heartbeat every [`HEARTBEAT_INTERVAL`] steps.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn run(&self, session: &mut Session, candidate: Candidate) -> Result<Metrics, EvaluationError> {
        let plan = self.controller.apply(session, candidate)?;
        let mut collector = MetricsCollector::new(session.step_length(), self.stop_speed);

        while session.steps() < self.horizon {
            session.step()?;
            let snapshot = session.snapshot()?;
            collector.observe(&snapshot);

            let step = session.steps();
            if self.verbose && step % HEARTBEAT_INTERVAL == 0 {
                log::info!(
                    target: PROGRESS_TARGET,
                    "{} step {} vehicles {} arrived_total {}",
                    plan,
                    step,
                    snapshot.vehicles.len(),
                    collector.arrived_total()
                );
            }

            if session.min_expected()? <= 0 {
                break;
            }
        }

        Ok(collector.finish(plan, session.steps()))
    }
}

impl CandidateEvaluator for Evaluator {
    fn evaluate(&mut self, candidate: Candidate) -> Result<Evaluation, EvaluationError> {
        let mut session = Session::open(self.launcher.as_ref(), &self.options)?;

        // Error paths close through Drop.
        let metrics = self.run(&mut session, candidate)?;
        session.close()?;

        let fitness = self.fitness.score(&metrics);
        log::debug!(
            "{} arrived {} wait {:.1} fitness {:.3}",
            metrics.candidate(),
            metrics.arrived_total,
            metrics.total_wait,
            fitness
        );
        Ok(Evaluation { metrics, fitness })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Backend, ScenarioConfig};
    use crate::sim::testing::ScriptedLauncher;
    use crate::sim::{is_session_open, serial_guard};
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> TuningConfig {
        let path = dir.path().join("Traci.sumocfg");
        fs::write(&path, "<configuration/>").unwrap();
        TuningConfig {
            horizon: 25,
            scenario: ScenarioConfig {
                backend: Backend::Sumo,
                config_path: Some(path),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_config_fails_fast() {
        let dir = TempDir::new().unwrap();
        let config = TuningConfig {
            scenario: ScenarioConfig {
                config_path: Some(dir.path().join("absent.sumocfg")),
                ..Default::default()
            },
            ..Default::default()
        };
        let launcher = ScriptedLauncher::with_phase_count(4);
        let log = std::rc::Rc::clone(&launcher.log);

        let result = Evaluator::new(&config, Box::new(launcher));
        assert!(matches!(
            result,
            Err(EvaluationError::Sim(SimError::MissingConfig(_)))
        ));
        assert_eq!(log.borrow().steps, 0);
    }

    #[test]
    fn test_empty_network_stops_after_one_step() {
        let _guard = serial_guard();
        let dir = TempDir::new().unwrap();
        let launcher = ScriptedLauncher::with_phase_count(4);
        let log = std::rc::Rc::clone(&launcher.log);
        let mut evaluator = Evaluator::new(&config_in(&dir), Box::new(launcher)).unwrap();

        let evaluation = evaluator.evaluate(Candidate::new(40, 50)).unwrap();

        assert_eq!(evaluation.metrics.steps_used, 1);
        assert_eq!(evaluation.metrics.arrived_total, 0);
        assert_eq!(evaluation.fitness, 0.0);
        assert!(log.borrow().closed);
        assert!(!is_session_open());
    }

    #[test]
    fn test_run_stops_at_horizon() {
        let _guard = serial_guard();
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let launcher = ScriptedLauncher::with_phase_count(4).with_pending(3);
        let log = std::rc::Rc::clone(&launcher.log);
        let mut evaluator = Evaluator::new(&config, Box::new(launcher)).unwrap();

        let evaluation = evaluator.evaluate(Candidate::new(40, 50)).unwrap();

        assert_eq!(evaluation.metrics.steps_used, config.horizon);
        assert_eq!(log.borrow().steps as u64, config.horizon);
        assert!(log.borrow().closed);
        assert!(!is_session_open());
    }

    #[test]
    fn test_phase_mismatch_closes_session() {
        let _guard = serial_guard();
        let dir = TempDir::new().unwrap();
        let launcher = ScriptedLauncher::with_phase_count(5);
        let log = std::rc::Rc::clone(&launcher.log);
        let mut evaluator = Evaluator::new(&config_in(&dir), Box::new(launcher)).unwrap();

        let err = evaluator.evaluate(Candidate::new(40, 50)).unwrap_err();

        assert!(matches!(
            err,
            EvaluationError::SignalPlan(SignalPlanError::PhaseCount { found: 5, .. })
        ));
        assert_eq!(log.borrow().steps, 0);
        assert!(log.borrow().closed);
        assert!(!is_session_open());
    }

    #[test]
    fn test_closure_evaluator() {
        let mut objective = |c: Candidate| -> Result<Evaluation, EvaluationError> {
            let metrics = Metrics {
                green_a: c.green_a,
                green_b: c.green_b,
                steps_used: 0,
                arrived_total: 0,
                total_wait: 0.0,
                avg_speed: 0.0,
            };
            Ok(Evaluation {
                metrics,
                fitness: (c.green_a + c.green_b) as f64,
            })
        };
        let evaluation = objective.evaluate(Candidate::new(3, 4)).unwrap();
        assert_eq!(evaluation.fitness, 7.0);
    }
}
