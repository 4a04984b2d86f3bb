//! SUMO backend: spawns `sumo`/`sumo-gui` and drives it over TraCI.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use super::traci::{
    CMD_GET_SIM_VARIABLE, CMD_GET_VEHICLE_VARIABLE, ID_LIST, TraciConnection,
    VAR_ARRIVED_VEHICLES_NUMBER, VAR_MIN_EXPECTED_VEHICLES, VAR_SPEED,
};
use super::{LaunchOptions, Launcher, ProgramLogic, SimError, Simulator};

/// Environment variable pointing at the SUMO installation.
pub const SUMO_HOME_VAR: &str = "SUMO_HOME";

/// Path of the SUMO binary, preferring `$SUMO_HOME/bin`.
pub fn sumo_binary(gui: bool) -> PathBuf {
    let name = if gui { "sumo-gui" } else { "sumo" };
    if let Some(home) = std::env::var_os(SUMO_HOME_VAR) {
        let candidate = PathBuf::from(home).join("bin").join(name);
        if candidate.is_file() {
            return candidate;
        }
    }
    PathBuf::from(name)
}

/// Launches SUMO processes with a TraCI server.
#[derive(Debug, Clone)]
pub struct SumoLauncher {
    /// Fixed TraCI port; a free one is picked when `None`.
    pub port: Option<u16>,
    /// Connection attempts while the process starts.
    pub connect_attempts: u32,
    /// Delay between connection attempts.
    pub retry_delay: Duration,
}

impl Default for SumoLauncher {
    fn default() -> Self {
        Self {
            port: None,
            connect_attempts: 60,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl SumoLauncher {
    /// Command-line arguments for one run.
    pub fn arguments(options: &LaunchOptions, port: u16) -> Vec<String> {
        let mut args = vec![
            "-c".to_string(),
            options.config_path.display().to_string(),
            "--step-length".to_string(),
            options.step_length.to_string(),
            "--delay".to_string(),
            "0".to_string(),
            "--lateral-resolution".to_string(),
            "0.1".to_string(),
            "--start".to_string(),
            "--remote-port".to_string(),
            port.to_string(),
        ];
        if options.gui {
            args.push("--quit-on-end".to_string());
        }
        args.extend(options.extra_args.iter().cloned());
        args
    }

    fn free_port() -> Result<u16, SimError> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        Ok(listener.local_addr()?.port())
    }
}

impl Launcher for SumoLauncher {
    fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Simulator>, SimError> {
        let port = match self.port {
            Some(port) => port,
            None => Self::free_port()?,
        };
        let binary = sumo_binary(options.gui);
        let args = Self::arguments(options, port);
        log::debug!("launching {} {}", binary.display(), args.join(" "));

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| SimError::Launch {
                binary: binary.display().to_string(),
                source,
            })?;

        let mut conn = match TraciConnection::connect(port, self.connect_attempts, self.retry_delay)
        {
            Ok(conn) => conn,
            Err(e) => {
                kill_child(&mut child);
                return Err(e);
            }
        };

        match conn.version() {
            Ok((api, name)) => log::debug!("connected to {} (TraCI API {})", name, api),
            Err(e) => {
                kill_child(&mut child);
                return Err(e);
            }
        }

        Ok(Box::new(SumoSimulator {
            conn,
            child: Some(child),
        }))
    }
}

fn kill_child(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill simulator process: {}", e);
    }
    let _ = child.wait();
}

/// A running SUMO process and its TraCI connection.
pub struct SumoSimulator {
    conn: TraciConnection,
    child: Option<Child>,
}

impl SumoSimulator {
    fn live(&mut self) -> Result<&mut TraciConnection, SimError> {
        if self.child.is_none() {
            return Err(SimError::Closed);
        }
        Ok(&mut self.conn)
    }
}

impl Simulator for SumoSimulator {
    fn step(&mut self) -> Result<(), SimError> {
        self.live()?.simulation_step()
    }

    fn vehicle_ids(&mut self) -> Result<Vec<String>, SimError> {
        self.live()?
            .get_string_list(CMD_GET_VEHICLE_VARIABLE, ID_LIST, "")
    }

    fn vehicle_speed(&mut self, vehicle_id: &str) -> Result<f64, SimError> {
        self.live()?
            .get_double(CMD_GET_VEHICLE_VARIABLE, VAR_SPEED, vehicle_id)
    }

    fn arrived_count(&mut self) -> Result<u32, SimError> {
        let n = self
            .live()?
            .get_int(CMD_GET_SIM_VARIABLE, VAR_ARRIVED_VEHICLES_NUMBER, "")?;
        u32::try_from(n).map_err(|_| SimError::Protocol(format!("negative arrival count {}", n)))
    }

    fn min_expected(&mut self) -> Result<i32, SimError> {
        self.live()?
            .get_int(CMD_GET_SIM_VARIABLE, VAR_MIN_EXPECTED_VEHICLES, "")
    }

    fn program_logics(&mut self, tls_id: &str) -> Result<Vec<ProgramLogic>, SimError> {
        self.live()?.get_logics(tls_id)
    }

    fn set_program_logic(&mut self, tls_id: &str, logic: &ProgramLogic) -> Result<(), SimError> {
        self.live()?.set_logic(tls_id, logic)
    }

    fn close(&mut self) -> Result<(), SimError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let result = self.conn.close();
        if result.is_err() {
            kill_child(&mut child);
        } else {
            child.wait()?;
        }
        result
    }
}

impl Drop for SumoSimulator {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            kill_child(&mut child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments() {
        let options = LaunchOptions {
            config_path: PathBuf::from("sumo_data/generated/Traci.sumocfg"),
            step_length: 0.05,
            gui: false,
            extra_args: vec!["--seed".to_string(), "7".to_string()],
        };
        let args = SumoLauncher::arguments(&options, 8813);
        assert_eq!(&args[..2], &["-c", "sumo_data/generated/Traci.sumocfg"]);
        assert!(args.windows(2).any(|w| w == ["--step-length", "0.05"]));
        assert!(args.windows(2).any(|w| w == ["--remote-port", "8813"]));
        assert!(!args.contains(&"--quit-on-end".to_string()));
        assert_eq!(&args[args.len() - 2..], &["--seed", "7"]);
    }

    #[test]
    fn test_gui_quits_on_end() {
        let options = LaunchOptions {
            config_path: PathBuf::from("Traci.sumocfg"),
            step_length: 0.05,
            gui: true,
            extra_args: Vec::new(),
        };
        let args = SumoLauncher::arguments(&options, 1);
        assert!(args.contains(&"--quit-on-end".to_string()));
    }
}
