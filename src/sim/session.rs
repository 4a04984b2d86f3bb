//! Scoped ownership of the one live simulator connection.

use std::sync::atomic::{AtomicBool, Ordering};

use super::{LaunchOptions, Launcher, SimError, Simulator};

/// Set while a [`Session`] is open anywhere in the process.
static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Whether a session is currently open in this process.
pub fn is_session_open() -> bool {
    SESSION_ACTIVE.load(Ordering::Acquire)
}

/// Per-step view of the network handed to the metrics collector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepSnapshot {
    /// Vehicles present after the step with their speeds.
    pub vehicles: Vec<(String, f64)>,
    /// Vehicles that completed their route during the step.
    pub arrived: u32,
}

/// One open-to-close lifecycle of a simulator connection.
///
/// Only one session may be open per process; opening a second one fails with
/// [`SimError::SessionBusy`]. The connection is closed by [`Session::close`]
/// or, on any other exit path, when the session is dropped.
pub struct Session {
    sim: Box<dyn Simulator>,
    steps: u64,
    step_length: f64,
    open: bool,
}

impl Session {
    /// Open a session.
    ///
    /// The configuration file is checked before the slot is taken or any
    /// simulator is started.
    pub fn open(launcher: &dyn Launcher, options: &LaunchOptions) -> Result<Self, SimError> {
        if !options.config_path.is_file() {
            return Err(SimError::MissingConfig(options.config_path.clone()));
        }

        if SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SimError::SessionBusy);
        }

        match launcher.launch(options) {
            Ok(sim) => {
                log::trace!("session opened on {}", options.config_path.display());
                Ok(Self {
                    sim,
                    steps: 0,
                    step_length: options.step_length,
                    open: true,
                })
            }
            Err(e) => {
                SESSION_ACTIVE.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Steps taken since open.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Simulated seconds per step.
    pub fn step_length(&self) -> f64 {
        self.step_length
    }

    /// Direct access to the connection for plan installation.
    pub fn simulator(&mut self) -> &mut dyn Simulator {
        self.sim.as_mut()
    }

    /// Advance by one step.
    pub fn step(&mut self) -> Result<(), SimError> {
        if !self.open {
            return Err(SimError::Closed);
        }
        self.sim.step()?;
        self.steps += 1;
        Ok(())
    }

    /// Query the vehicles and arrivals of the last step.
    pub fn snapshot(&mut self) -> Result<StepSnapshot, SimError> {
        let ids = self.sim.vehicle_ids()?;
        let mut vehicles = Vec::with_capacity(ids.len());
        for id in ids {
            let speed = self.sim.vehicle_speed(&id)?;
            vehicles.push((id, speed));
        }
        let arrived = self.sim.arrived_count()?;
        Ok(StepSnapshot { vehicles, arrived })
    }

    /// Vehicles present plus vehicles still expected.
    pub fn min_expected(&mut self) -> Result<i32, SimError> {
        self.sim.min_expected()
    }

    /// Close the connection and release the process-wide slot.
    pub fn close(mut self) -> Result<(), SimError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), SimError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let result = self.sim.close();
        SESSION_ACTIVE.store(false, Ordering::Release);
        log::trace!("session closed after {} steps", self.steps);
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Failed to close simulation session: {}", e);
        }
    }
}

/// Serializes tests that open sessions.
#[cfg(test)]
pub(crate) fn serial_guard() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
