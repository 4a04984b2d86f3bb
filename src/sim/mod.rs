//! Simulator seam - the control interface shared by all simulation backends.
//!
//! A backend is a [`Launcher`] that starts one simulation from a configuration
//! file and hands back a [`Simulator`] connection. The [`Session`] wraps that
//! connection with the single-session guard and guaranteed close.
//!
//! Two backends are provided:
//!
//! - [`SumoLauncher`]: an external `sumo`/`sumo-gui` process driven over TraCI
//! - [`QueueLauncher`]: a deterministic in-process point-queue simulator

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::schema::{Backend, ScenarioConfig};

mod queue;
mod session;
mod sumo;
pub mod traci;

pub use queue::{Approach, Flow, QueueLauncher, QueueScenario, QueueSimulator, TrafficLightSpec};
pub use session::{Session, StepSnapshot, is_session_open};
pub use sumo::{SumoLauncher, SumoSimulator, sumo_binary};

#[cfg(test)]
pub(crate) use session::serial_guard;

/// One phase of a traffic-light program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Phase duration in seconds.
    pub duration: f64,
    /// Signal state per controlled link (`G`/`g` green, `y` yellow, `r` red).
    pub state: String,
    #[serde(default)]
    pub min_dur: f64,
    #[serde(default)]
    pub max_dur: f64,
    #[serde(default)]
    pub next: Vec<i32>,
    #[serde(default)]
    pub name: String,
}

impl Phase {
    pub fn new(duration: f64, state: &str) -> Self {
        Self {
            duration,
            state: state.to_string(),
            min_dur: duration,
            max_dur: duration,
            next: Vec::new(),
            name: String::new(),
        }
    }

    /// Whether the link at `link_index` may proceed in this phase.
    pub fn is_green(&self, link_index: usize) -> bool {
        matches!(self.state.as_bytes().get(link_index), Some(b'G' | b'g'))
    }
}

/// A complete traffic-light program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramLogic {
    #[serde(default)]
    pub program_id: String,
    /// Program type as reported by the simulator (0 = static).
    #[serde(default)]
    pub kind: i32,
    #[serde(default)]
    pub current_phase: i32,
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub params: Vec<(String, String)>,
}

impl ProgramLogic {
    pub fn new(program_id: &str, phases: Vec<Phase>) -> Self {
        Self {
            program_id: program_id.to_string(),
            kind: 0,
            current_phase: 0,
            phases,
            params: Vec::new(),
        }
    }

    /// Sum of all phase durations.
    pub fn cycle_length(&self) -> f64 {
        self.phases.iter().map(|p| p.duration).sum()
    }
}

/// Options for starting one simulation.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Simulator configuration file.
    pub config_path: PathBuf,
    /// Simulated seconds per step.
    pub step_length: f64,
    /// Start the visual front end where the backend has one.
    pub gui: bool,
    /// Additional backend-specific arguments.
    pub extra_args: Vec<String>,
}

impl LaunchOptions {
    pub fn from_scenario(scenario: &ScenarioConfig) -> Self {
        Self {
            config_path: scenario.resolved_config_path(),
            step_length: scenario.step_length,
            gui: false,
            extra_args: scenario.extra_args.clone(),
        }
    }
}

/// Control connection to one running simulation.
///
/// All calls block until the simulator answers.
pub trait Simulator {
    /// Advance simulated time by one step.
    fn step(&mut self) -> Result<(), SimError>;

    /// Identifiers of vehicles currently in the network.
    fn vehicle_ids(&mut self) -> Result<Vec<String>, SimError>;

    /// Instantaneous speed of a vehicle (m/s).
    fn vehicle_speed(&mut self, vehicle_id: &str) -> Result<f64, SimError>;

    /// Vehicles that completed their route during the last step.
    fn arrived_count(&mut self) -> Result<u32, SimError>;

    /// Vehicles present plus vehicles still expected to enter.
    fn min_expected(&mut self) -> Result<i32, SimError>;

    /// All programs defined for a traffic light.
    fn program_logics(&mut self, tls_id: &str) -> Result<Vec<ProgramLogic>, SimError>;

    /// Install a program on a traffic light for the rest of the run.
    fn set_program_logic(&mut self, tls_id: &str, logic: &ProgramLogic) -> Result<(), SimError>;

    /// Terminate the simulation. Further calls fail.
    fn close(&mut self) -> Result<(), SimError>;
}

/// Starts simulations for one backend.
pub trait Launcher {
    fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Simulator>, SimError>;
}

/// Launcher for a configured backend.
pub fn launcher_for(backend: Backend) -> Box<dyn Launcher> {
    match backend {
        Backend::Sumo => Box::new(SumoLauncher::default()),
        Backend::Queue => Box::new(QueueLauncher),
    }
}

/// Simulator control errors. All of them are fatal to the current run.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Missing simulator config: {0}")]
    MissingConfig(PathBuf),
    #[error("A simulation session is already open")]
    SessionBusy,
    #[error("Simulation session is closed")]
    Closed,
    #[error("Failed to launch {binary}: {source}")]
    Launch {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("Could not connect to simulator on port {port} after {attempts} attempts")]
    Connect { port: u16, attempts: u32 },
    #[error("Simulator rejected command 0x{command:02x}: {message}")]
    Command { command: u8, message: String },
    #[error("Malformed simulator response: {0}")]
    Protocol(String),
    #[error("Unknown traffic light: {0}")]
    UnknownTrafficLight(String),
    #[error("Unknown vehicle: {0}")]
    UnknownVehicle(String),
    #[error("Invalid scenario: {0}")]
    Scenario(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted simulator for exercising callers without a backend.

    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Calls observed by a [`ScriptedSimulator`].
    #[derive(Debug, Default)]
    pub struct CallLog {
        pub steps: usize,
        pub installed: Vec<ProgramLogic>,
        pub closed: bool,
    }

    /// Serves a fixed program and an empty network that reports `pending`
    /// vehicles still expected.
    pub struct ScriptedSimulator {
        pub program: ProgramLogic,
        pub pending: i32,
        pub log: Rc<RefCell<CallLog>>,
    }

    impl Simulator for ScriptedSimulator {
        fn step(&mut self) -> Result<(), SimError> {
            self.log.borrow_mut().steps += 1;
            Ok(())
        }

        fn vehicle_ids(&mut self) -> Result<Vec<String>, SimError> {
            Ok(Vec::new())
        }

        fn vehicle_speed(&mut self, vehicle_id: &str) -> Result<f64, SimError> {
            Err(SimError::UnknownVehicle(vehicle_id.to_string()))
        }

        fn arrived_count(&mut self) -> Result<u32, SimError> {
            Ok(0)
        }

        fn min_expected(&mut self) -> Result<i32, SimError> {
            Ok(self.pending)
        }

        fn program_logics(&mut self, _tls_id: &str) -> Result<Vec<ProgramLogic>, SimError> {
            Ok(vec![self.program.clone()])
        }

        fn set_program_logic(
            &mut self,
            _tls_id: &str,
            logic: &ProgramLogic,
        ) -> Result<(), SimError> {
            self.log.borrow_mut().installed.push(logic.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<(), SimError> {
            self.log.borrow_mut().closed = true;
            Ok(())
        }
    }

    /// Launches [`ScriptedSimulator`]s sharing one call log.
    pub struct ScriptedLauncher {
        pub program: ProgramLogic,
        pub pending: i32,
        pub log: Rc<RefCell<CallLog>>,
    }

    impl ScriptedLauncher {
        pub fn with_phase_count(count: usize) -> Self {
            let phases = (0..count).map(|_| Phase::new(30.0, "GGrr")).collect();
            Self {
                program: ProgramLogic::new("0", phases),
                pending: 0,
                log: Rc::new(RefCell::new(CallLog::default())),
            }
        }

        /// Keep reporting demand so runs only end at the horizon.
        pub fn with_pending(mut self, pending: i32) -> Self {
            self.pending = pending;
            self
        }
    }

    impl Launcher for ScriptedLauncher {
        fn launch(&self, _options: &LaunchOptions) -> Result<Box<dyn Simulator>, SimError> {
            Ok(Box::new(ScriptedSimulator {
                program: self.program.clone(),
                pending: self.pending,
                log: Rc::clone(&self.log),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_is_green() {
        let phase = Phase::new(30.0, "GgyR");
        assert!(phase.is_green(0));
        assert!(phase.is_green(1));
        assert!(!phase.is_green(2));
        assert!(!phase.is_green(3));
        assert!(!phase.is_green(10));
    }

    #[test]
    fn test_cycle_length() {
        let logic = ProgramLogic::new(
            "0",
            vec![
                Phase::new(30.0, "GGrr"),
                Phase::new(3.0, "yyrr"),
                Phase::new(40.0, "rrGG"),
                Phase::new(3.0, "rryy"),
            ],
        );
        assert!((logic.cycle_length() - 76.0).abs() < 1e-12);
    }
}
