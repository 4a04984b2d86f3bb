//! Built-in point-queue simulator for one signalized junction.
//!
//! Vehicles enter each approach from probabilistic flows, travel at free speed
//! to the stop line, and join a FIFO queue at zero speed unless they can pass
//! straight through. While an approach shows green, the queue discharges one
//! vehicle per saturation headway once the startup lost time has elapsed.
//! Discharged vehicles cross the exit link at free speed and then arrive.
//!
//! Runs are deterministic for a given scenario seed, and the demand stream
//! does not depend on the signal program, so two plans see the same vehicles.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::Path;

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use super::{LaunchOptions, Launcher, ProgramLogic, SimError, Simulator};

/// Scenario description read from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueScenario {
    /// Seed of the demand generator.
    #[serde(default)]
    pub seed: u64,
    pub approaches: Vec<Approach>,
    pub flows: Vec<Flow>,
    pub traffic_light: TrafficLightSpec,
    /// Seconds after the start of green before the first departure.
    #[serde(default = "default_startup_lost_time")]
    pub startup_lost_time: f64,
    /// Seconds between consecutive departures from one queue.
    #[serde(default = "default_saturation_headway")]
    pub saturation_headway: f64,
}

fn default_startup_lost_time() -> f64 {
    2.0
}
fn default_saturation_headway() -> f64 {
    2.0
}

/// An incoming road controlled by one signal link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approach {
    pub id: String,
    /// Index into the phase state strings.
    pub link_index: usize,
    /// Distance from entry to the stop line (m).
    #[serde(default = "default_link_length")]
    pub approach_length: f64,
    /// Distance from the stop line to the exit (m).
    #[serde(default = "default_link_length")]
    pub exit_length: f64,
    /// Free-flow speed (m/s).
    #[serde(default = "default_free_speed")]
    pub free_speed: f64,
}

fn default_link_length() -> f64 {
    200.0
}
fn default_free_speed() -> f64 {
    13.89
}

/// Probabilistic vehicle flow onto one approach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub approach: String,
    /// Insertion probability per simulated second.
    pub probability: f64,
    #[serde(default)]
    pub begin: f64,
    pub end: f64,
}

/// The controlled junction and its initial program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficLightSpec {
    pub id: String,
    pub program: ProgramLogic,
}

impl QueueScenario {
    /// Load and validate a scenario file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let scenario: Self = serde_json::from_str(&content)
            .map_err(|e| SimError::Scenario(format!("{}: {}", path.display(), e)))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.approaches.is_empty() {
            return Err(SimError::Scenario("no approaches defined".to_string()));
        }
        for approach in &self.approaches {
            if !(approach.approach_length > 0.0
                && approach.exit_length > 0.0
                && approach.free_speed > 0.0)
            {
                return Err(SimError::Scenario(format!(
                    "approach {} needs positive lengths and speed",
                    approach.id
                )));
            }
        }
        for flow in &self.flows {
            if !self.approaches.iter().any(|a| a.id == flow.approach) {
                return Err(SimError::Scenario(format!(
                    "flow {} references unknown approach {}",
                    flow.id, flow.approach
                )));
            }
            if !(0.0..=1.0).contains(&flow.probability) || flow.begin > flow.end {
                return Err(SimError::Scenario(format!(
                    "flow {} has invalid probability or interval",
                    flow.id
                )));
            }
        }
        if !(self.saturation_headway > 0.0 && self.startup_lost_time >= 0.0) {
            return Err(SimError::Scenario(
                "headway must be positive and lost time non-negative".to_string(),
            ));
        }
        self.check_program(&self.traffic_light.program)
    }

    fn check_program(&self, program: &ProgramLogic) -> Result<(), SimError> {
        if program.phases.is_empty() {
            return Err(SimError::Scenario("program has no phases".to_string()));
        }
        if program
            .phases
            .iter()
            .any(|p| !(p.duration.is_finite() && p.duration >= 0.0))
        {
            return Err(SimError::Scenario(
                "phase durations must be finite and non-negative".to_string(),
            ));
        }
        if program.cycle_length() <= 0.0 {
            return Err(SimError::Scenario("program cycle is empty".to_string()));
        }
        let links = self
            .approaches
            .iter()
            .map(|a| a.link_index + 1)
            .max()
            .unwrap_or(0);
        if let Some(phase) = program.phases.iter().find(|p| p.state.len() < links) {
            return Err(SimError::Scenario(format!(
                "phase state '{}' covers fewer than {} links",
                phase.state, links
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum VehicleState {
    Approaching { to_stop_line: f64 },
    Queued,
    Exiting { to_exit: f64 },
}

#[derive(Debug, Clone)]
struct Vehicle {
    id: String,
    approach: usize,
    state: VehicleState,
}

/// Running instance of a [`QueueScenario`].
pub struct QueueSimulator {
    scenario: QueueScenario,
    program: ProgramLogic,
    step_length: f64,
    time: f64,
    phase_index: usize,
    phase_elapsed: f64,
    /// Start of the current green per approach.
    green_since: Vec<Option<f64>>,
    /// Earliest next departure per approach.
    next_discharge: Vec<f64>,
    queues: Vec<VecDeque<u64>>,
    vehicles: BTreeMap<u64, Vehicle>,
    by_id: HashMap<String, u64>,
    next_serial: u64,
    flow_approach: Vec<usize>,
    flow_emitted: Vec<u64>,
    arrived_last_step: u32,
    rng: StdRng,
    closed: bool,
}

impl QueueSimulator {
    pub fn new(scenario: QueueScenario, step_length: f64) -> Result<Self, SimError> {
        scenario.validate()?;
        if !(step_length.is_finite() && step_length > 0.0) {
            return Err(SimError::Scenario(format!(
                "invalid step length {}",
                step_length
            )));
        }

        let flow_approach = scenario
            .flows
            .iter()
            .map(|f| {
                scenario
                    .approaches
                    .iter()
                    .position(|a| a.id == f.approach)
                    .unwrap_or_default()
            })
            .collect();
        let approaches = scenario.approaches.len();
        let flows = scenario.flows.len();

        let mut sim = Self {
            program: scenario.traffic_light.program.clone(),
            rng: StdRng::seed_from_u64(scenario.seed),
            step_length,
            time: 0.0,
            phase_index: 0,
            phase_elapsed: 0.0,
            green_since: vec![None; approaches],
            next_discharge: vec![0.0; approaches],
            queues: vec![VecDeque::new(); approaches],
            vehicles: BTreeMap::new(),
            by_id: HashMap::new(),
            next_serial: 0,
            flow_approach,
            flow_emitted: vec![0; flows],
            arrived_last_step: 0,
            closed: false,
            scenario,
        };
        sim.phase_index = sim.start_phase();
        sim.refresh_signal();
        Ok(sim)
    }

    /// Vehicles waiting at the stop line of each approach.
    pub fn queue_lengths(&self) -> Vec<usize> {
        self.queues.iter().map(VecDeque::len).collect()
    }

    fn ensure_open(&self) -> Result<(), SimError> {
        if self.closed {
            Err(SimError::Closed)
        } else {
            Ok(())
        }
    }

    fn start_phase(&self) -> usize {
        usize::try_from(self.program.current_phase)
            .ok()
            .filter(|&i| i < self.program.phases.len())
            .unwrap_or(0)
    }

    fn refresh_signal(&mut self) {
        let phase = &self.program.phases[self.phase_index];
        for (i, approach) in self.scenario.approaches.iter().enumerate() {
            if phase.is_green(approach.link_index) {
                if self.green_since[i].is_none() {
                    self.green_since[i] = Some(self.time);
                }
            } else {
                self.green_since[i] = None;
            }
        }
    }

    fn advance_phase(&mut self) {
        self.phase_elapsed += self.step_length;
        let count = self.program.phases.len();
        loop {
            let duration = self.program.phases[self.phase_index].duration;
            if self.phase_elapsed < duration {
                break;
            }
            self.phase_elapsed -= duration;
            self.phase_index = (self.phase_index + 1) % count;
        }
        self.refresh_signal();
    }

    fn can_discharge(&self, approach: usize) -> bool {
        self.green_since[approach]
            .is_some_and(|start| self.time >= start + self.scenario.startup_lost_time)
            && self.time >= self.next_discharge[approach]
    }

    fn depart(&mut self, serial: u64, approach: usize) {
        let exit_length = self.scenario.approaches[approach].exit_length;
        if let Some(vehicle) = self.vehicles.get_mut(&serial) {
            vehicle.state = VehicleState::Exiting {
                to_exit: exit_length,
            };
        }
        self.next_discharge[approach] = self.time + self.scenario.saturation_headway;
    }

    fn move_exiting(&mut self) {
        let dt = self.step_length;
        let mut done = Vec::new();
        for (&serial, vehicle) in self.vehicles.iter_mut() {
            if let VehicleState::Exiting { to_exit } = &mut vehicle.state {
                *to_exit -= self.scenario.approaches[vehicle.approach].free_speed * dt;
                if *to_exit <= 0.0 {
                    done.push(serial);
                }
            }
        }
        self.arrived_last_step = done.len() as u32;
        for serial in done {
            if let Some(vehicle) = self.vehicles.remove(&serial) {
                self.by_id.remove(&vehicle.id);
            }
        }
    }

    fn discharge_queues(&mut self) {
        for approach in 0..self.queues.len() {
            if !self.can_discharge(approach) {
                continue;
            }
            if let Some(serial) = self.queues[approach].pop_front() {
                self.depart(serial, approach);
            }
        }
    }

    fn move_approaching(&mut self) {
        let dt = self.step_length;
        let mut reached = Vec::new();
        for (&serial, vehicle) in self.vehicles.iter_mut() {
            if let VehicleState::Approaching { to_stop_line } = &mut vehicle.state {
                *to_stop_line -= self.scenario.approaches[vehicle.approach].free_speed * dt;
                if *to_stop_line <= 0.0 {
                    reached.push((serial, vehicle.approach));
                }
            }
        }

        for (serial, approach) in reached {
            if self.queues[approach].is_empty() && self.can_discharge(approach) {
                self.depart(serial, approach);
            } else {
                if let Some(vehicle) = self.vehicles.get_mut(&serial) {
                    vehicle.state = VehicleState::Queued;
                }
                self.queues[approach].push_back(serial);
            }
        }
    }

    fn spawn(&mut self, at: f64) {
        for i in 0..self.scenario.flows.len() {
            // One draw per flow per step keeps demand independent of the signal.
            let draw: f64 = self.rng.r#gen();
            let flow = &self.scenario.flows[i];
            if at < flow.begin || at >= flow.end {
                continue;
            }
            if draw >= flow.probability * self.step_length {
                continue;
            }

            let approach = self.flow_approach[i];
            let id = format!("{}.{}", flow.id, self.flow_emitted[i]);
            self.flow_emitted[i] += 1;

            let serial = self.next_serial;
            self.next_serial += 1;
            self.by_id.insert(id.clone(), serial);
            self.vehicles.insert(
                serial,
                Vehicle {
                    id,
                    approach,
                    state: VehicleState::Approaching {
                        to_stop_line: self.scenario.approaches[approach].approach_length,
                    },
                },
            );
        }
    }
}

impl Simulator for QueueSimulator {
    fn step(&mut self) -> Result<(), SimError> {
        self.ensure_open()?;
        let start = self.time;
        self.time += self.step_length;
        self.advance_phase();

        self.move_exiting();
        self.discharge_queues();
        self.move_approaching();
        self.spawn(start);
        Ok(())
    }

    fn vehicle_ids(&mut self) -> Result<Vec<String>, SimError> {
        self.ensure_open()?;
        Ok(self.vehicles.values().map(|v| v.id.clone()).collect())
    }

    fn vehicle_speed(&mut self, vehicle_id: &str) -> Result<f64, SimError> {
        self.ensure_open()?;
        let vehicle = self
            .by_id
            .get(vehicle_id)
            .and_then(|serial| self.vehicles.get(serial))
            .ok_or_else(|| SimError::UnknownVehicle(vehicle_id.to_string()))?;
        Ok(match vehicle.state {
            VehicleState::Queued => 0.0,
            VehicleState::Approaching { .. } | VehicleState::Exiting { .. } => {
                self.scenario.approaches[vehicle.approach].free_speed
            }
        })
    }

    fn arrived_count(&mut self) -> Result<u32, SimError> {
        self.ensure_open()?;
        Ok(self.arrived_last_step)
    }

    fn min_expected(&mut self) -> Result<i32, SimError> {
        self.ensure_open()?;
        let pending = self
            .scenario
            .flows
            .iter()
            .filter(|f| self.time < f.end)
            .count();
        Ok((self.vehicles.len() + pending) as i32)
    }

    fn program_logics(&mut self, tls_id: &str) -> Result<Vec<ProgramLogic>, SimError> {
        self.ensure_open()?;
        if tls_id != self.scenario.traffic_light.id {
            return Err(SimError::UnknownTrafficLight(tls_id.to_string()));
        }
        Ok(vec![self.program.clone()])
    }

    fn set_program_logic(&mut self, tls_id: &str, logic: &ProgramLogic) -> Result<(), SimError> {
        self.ensure_open()?;
        if tls_id != self.scenario.traffic_light.id {
            return Err(SimError::UnknownTrafficLight(tls_id.to_string()));
        }
        self.scenario.check_program(logic)?;
        self.program = logic.clone();
        self.phase_index = self.start_phase();
        self.phase_elapsed = 0.0;
        self.refresh_signal();
        Ok(())
    }

    fn close(&mut self) -> Result<(), SimError> {
        self.closed = true;
        Ok(())
    }
}

/// Launches [`QueueSimulator`]s from scenario files.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueLauncher;

impl Launcher for QueueLauncher {
    fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Simulator>, SimError> {
        let scenario = QueueScenario::load(&options.config_path)?;
        if options.gui {
            log::info!("Built-in simulator has no GUI, running headless");
        }
        Ok(Box::new(QueueSimulator::new(scenario, options.step_length)?))
    }
}
