//! Installs a candidate timing plan on the controlled traffic light.

use crate::schema::{Candidate, GreenBounds, TuningConfig};
use crate::sim::{Session, SimError};

/// Phases in the assumed program: green A, yellow, green B, yellow.
pub const PHASE_COUNT: usize = 4;

/// Plan installation errors. None of them are recoverable within a run.
#[derive(Debug, thiserror::Error)]
pub enum SignalPlanError {
    #[error("Expected {expected} phases for {tls_id}, found {found}")]
    PhaseCount {
        tls_id: String,
        expected: usize,
        found: usize,
    },
    #[error("Traffic light {0} has no program")]
    NoProgram(String),
    #[error("Plan must be applied before the first step, session is at step {0}")]
    SessionAdvanced(u64),
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// Rewrites the four-phase program of one traffic light.
#[derive(Debug, Clone)]
pub struct SignalPlanController {
    tls_id: String,
    yellow: f64,
    bounds: GreenBounds,
}

impl SignalPlanController {
    pub fn new(tls_id: impl Into<String>, yellow: i32, bounds: GreenBounds) -> Self {
        Self {
            tls_id: tls_id.into(),
            yellow: yellow as f64,
            bounds,
        }
    }

    pub fn from_config(config: &TuningConfig) -> Self {
        Self::new(config.tls_id.clone(), config.yellow, config.bounds())
    }

    /// Apply `candidate` to a freshly opened session.
    ///
    /// Greens are clamped again here regardless of where the candidate came
    /// from. Returns the plan actually installed.
    pub fn apply(
        &self,
        session: &mut Session,
        candidate: Candidate,
    ) -> Result<Candidate, SignalPlanError> {
        if session.steps() > 0 {
            return Err(SignalPlanError::SessionAdvanced(session.steps()));
        }

        let sim = session.simulator();
        let mut logic = sim
            .program_logics(&self.tls_id)?
            .into_iter()
            .next()
            .ok_or_else(|| SignalPlanError::NoProgram(self.tls_id.clone()))?;

        if logic.phases.len() != PHASE_COUNT {
            return Err(SignalPlanError::PhaseCount {
                tls_id: self.tls_id.clone(),
                expected: PHASE_COUNT,
                found: logic.phases.len(),
            });
        }

        let plan = candidate.clamped(&self.bounds);
        let durations = [
            plan.green_a as f64,
            self.yellow,
            plan.green_b as f64,
            self.yellow,
        ];
        for (phase, duration) in logic.phases.iter_mut().zip(durations) {
            phase.duration = duration;
        }

        sim.set_program_logic(&self.tls_id, &logic)?;
        log::trace!("installed plan {} on {}", plan, self.tls_id);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::testing::ScriptedLauncher;
    use crate::sim::{LaunchOptions, serial_guard};
    use tempfile::NamedTempFile;

    fn open(launcher: &ScriptedLauncher, file: &NamedTempFile) -> Session {
        let options = LaunchOptions {
            config_path: file.path().to_path_buf(),
            step_length: 0.05,
            gui: false,
            extra_args: Vec::new(),
        };
        Session::open(launcher, &options).unwrap()
    }

    fn controller() -> SignalPlanController {
        SignalPlanController::new("J11", 3, GreenBounds::new(10, 80))
    }

    #[test]
    fn test_apply_writes_durations() {
        let _guard = serial_guard();
        let file = NamedTempFile::new().unwrap();
        let launcher = ScriptedLauncher::with_phase_count(4);
        let mut session = open(&launcher, &file);

        let plan = controller()
            .apply(&mut session, Candidate::new(25, 60))
            .unwrap();
        session.close().unwrap();

        assert_eq!(plan, Candidate::new(25, 60));
        let log = launcher.log.borrow();
        let durations: Vec<f64> = log.installed[0].phases.iter().map(|p| p.duration).collect();
        assert_eq!(durations, vec![25.0, 3.0, 60.0, 3.0]);
    }

    #[test]
    fn test_apply_clamps_again() {
        let _guard = serial_guard();
        let file = NamedTempFile::new().unwrap();
        let launcher = ScriptedLauncher::with_phase_count(4);
        let mut session = open(&launcher, &file);

        let plan = controller()
            .apply(&mut session, Candidate::new(2, 500))
            .unwrap();
        assert_eq!(plan, Candidate::new(10, 80));
    }

    #[test]
    fn test_wrong_phase_count_fails_before_stepping() {
        let _guard = serial_guard();
        let file = NamedTempFile::new().unwrap();

        for count in [3, 5] {
            let launcher = ScriptedLauncher::with_phase_count(count);
            let mut session = open(&launcher, &file);

            let err = controller()
                .apply(&mut session, Candidate::new(30, 30))
                .unwrap_err();
            assert!(matches!(
                err,
                SignalPlanError::PhaseCount { found, expected: 4, .. } if found == count
            ));
            drop(session);

            let log = launcher.log.borrow();
            assert_eq!(log.steps, 0);
            assert!(log.installed.is_empty());
            assert!(log.closed);
        }
    }

    #[test]
    fn test_apply_after_step_rejected() {
        let _guard = serial_guard();
        let file = NamedTempFile::new().unwrap();
        let launcher = ScriptedLauncher::with_phase_count(4);
        let mut session = open(&launcher, &file);
        session.step().unwrap();

        let err = controller()
            .apply(&mut session, Candidate::new(30, 30))
            .unwrap_err();
        assert!(matches!(err, SignalPlanError::SessionAdvanced(1)));
    }
}
