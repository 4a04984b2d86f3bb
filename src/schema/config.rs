//! Configuration types for signal-plan tuning runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::GreenBounds;

/// Environment variable selecting the scenario directory under `sumo_data/`.
pub const MAP_ENV_VAR: &str = "SUMO_MAP";

/// Map used when neither the config nor the environment names one.
pub const DEFAULT_MAP: &str = "generated";

/// Top-level configuration for a tuning run.
///
/// Every tunable of the search lives here; nothing is read from hidden
/// constants at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Lower bound for both green durations (seconds, inclusive).
    #[serde(default = "default_green_min")]
    pub green_min: i32,
    /// Upper bound for both green durations (seconds, inclusive).
    #[serde(default = "default_green_max")]
    pub green_max: i32,
    /// Fixed yellow duration written into phases 1 and 3.
    #[serde(default = "default_yellow")]
    pub yellow: i32,
    /// Candidates per generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Number of generations to run. There is no early stopping.
    #[serde(default = "default_generations")]
    pub generations: usize,
    /// Top candidates carried unchanged into the next generation.
    #[serde(default = "default_elite_count")]
    pub elite_count: usize,
    /// Standard deviation (seconds) of Gaussian mutation.
    #[serde(default = "default_mutation_std")]
    pub mutation_std: f64,
    /// Weight of the waiting-time penalty in the fitness.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Maximum simulation steps per evaluation.
    #[serde(default = "default_horizon")]
    pub horizon: u64,
    /// Traffic light whose program is rewritten.
    #[serde(default = "default_tls_id")]
    pub tls_id: String,
    /// Reproduction strategy.
    #[serde(default)]
    pub strategy: SearchStrategy,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Append-only per-generation history log.
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    /// Re-run the winning plan with the GUI and verbose logging at the end.
    #[serde(default = "default_replay_best")]
    pub replay_best: bool,
    /// Simulator backend and scenario location.
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            green_min: default_green_min(),
            green_max: default_green_max(),
            yellow: default_yellow(),
            population_size: default_population_size(),
            generations: default_generations(),
            elite_count: default_elite_count(),
            mutation_std: default_mutation_std(),
            alpha: default_alpha(),
            horizon: default_horizon(),
            tls_id: default_tls_id(),
            strategy: SearchStrategy::default(),
            random_seed: None,
            history_path: default_history_path(),
            replay_best: default_replay_best(),
            scenario: ScenarioConfig::default(),
        }
    }
}

fn default_green_min() -> i32 {
    10
}
fn default_green_max() -> i32 {
    80
}
fn default_yellow() -> i32 {
    3
}
fn default_population_size() -> usize {
    12
}
fn default_generations() -> usize {
    10
}
fn default_elite_count() -> usize {
    4
}
fn default_mutation_std() -> f64 {
    6.0
}
fn default_alpha() -> f64 {
    0.01
}
fn default_horizon() -> u64 {
    4000
}
fn default_tls_id() -> String {
    "J11".to_string()
}
fn default_history_path() -> PathBuf {
    PathBuf::from("ga_history.csv")
}
fn default_replay_best() -> bool {
    true
}

impl TuningConfig {
    /// Green-duration bounds as a value type.
    pub fn bounds(&self) -> GreenBounds {
        GreenBounds::new(self.green_min, self.green_max)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.green_min <= 0 || self.green_min > self.green_max {
            return Err(ConfigError::InvalidGreenBounds {
                min: self.green_min,
                max: self.green_max,
            });
        }
        if self.yellow < 0 {
            return Err(ConfigError::InvalidYellow(self.yellow));
        }
        if self.population_size < 2 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if self.generations == 0 {
            return Err(ConfigError::NoGenerations);
        }
        // Parents are two distinct elites.
        if self.elite_count < 2 || self.elite_count > self.population_size {
            return Err(ConfigError::InvalidEliteCount {
                elite_count: self.elite_count,
                population_size: self.population_size,
            });
        }
        if !self.mutation_std.is_finite() || self.mutation_std < 0.0 {
            return Err(ConfigError::InvalidMutationStd(self.mutation_std));
        }
        if !self.alpha.is_finite() {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }
        if self.horizon == 0 {
            return Err(ConfigError::InvalidHorizon);
        }
        if self.tls_id.is_empty() {
            return Err(ConfigError::MissingTrafficLight);
        }
        self.strategy.validate()?;
        self.scenario.validate()
    }
}

/// Reproduction strategy for the search engine.
///
/// Both variants share selection and elitism; they differ in how a child is
/// varied after two elites are picked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SearchStrategy {
    /// Gene-swap crossover and per-gene Gaussian perturbation.
    Gaussian {
        /// Probability that each gene is perturbed.
        #[serde(default = "default_mutation_rate")]
        mutation_rate: f64,
    },
    /// Single-point crossover and uniform reset of a fraction of the genes.
    RandomReset {
        /// Percentage of genes reset per child (at least one gene).
        #[serde(default = "default_mutation_percent_genes")]
        mutation_percent_genes: f64,
    },
}

impl Default for SearchStrategy {
    fn default() -> Self {
        Self::Gaussian {
            mutation_rate: default_mutation_rate(),
        }
    }
}

fn default_mutation_rate() -> f64 {
    0.8
}
fn default_mutation_percent_genes() -> f64 {
    50.0
}

impl SearchStrategy {
    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            SearchStrategy::Gaussian { mutation_rate } => {
                if !(0.0..=1.0).contains(&mutation_rate) {
                    return Err(ConfigError::InvalidMutationRate(mutation_rate));
                }
            }
            SearchStrategy::RandomReset {
                mutation_percent_genes,
            } => {
                if !(0.0..=100.0).contains(&mutation_percent_genes) {
                    return Err(ConfigError::InvalidMutationRate(mutation_percent_genes));
                }
            }
        }
        Ok(())
    }
}

/// Which simulator drives the evaluations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// External SUMO process over TraCI.
    #[default]
    Sumo,
    /// Built-in point-queue simulator reading a JSON scenario.
    Queue,
}

/// Location and stepping parameters of the simulated scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub backend: Backend,
    /// Repository root holding `sumo_data/`.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Map directory name. Falls back to `SUMO_MAP`, then `generated`.
    #[serde(default)]
    pub map: Option<String>,
    /// Configuration file name inside the map directory.
    #[serde(default = "default_config_file")]
    pub config_file: String,
    /// Explicit configuration path, bypassing the map layout.
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    /// Simulated seconds per step.
    #[serde(default = "default_step_length")]
    pub step_length: f64,
    /// Speed below which a vehicle counts as waiting.
    #[serde(default = "default_stop_speed")]
    pub stop_speed: f64,
    /// Additional arguments passed to the simulator binary.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            root: default_root(),
            map: None,
            config_file: default_config_file(),
            config_path: None,
            step_length: default_step_length(),
            stop_speed: default_stop_speed(),
            extra_args: Vec::new(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_config_file() -> String {
    "Traci.sumocfg".to_string()
}
fn default_step_length() -> f64 {
    0.05
}
fn default_stop_speed() -> f64 {
    0.1
}

impl ScenarioConfig {
    /// Map name after applying the environment override.
    pub fn map_name(&self) -> String {
        self.map
            .clone()
            .or_else(|| std::env::var(MAP_ENV_VAR).ok().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| DEFAULT_MAP.to_string())
    }

    /// Resolved path of the simulator configuration file.
    pub fn resolved_config_path(&self) -> PathBuf {
        match &self.config_path {
            Some(path) => path.clone(),
            None => self
                .root
                .join("sumo_data")
                .join(self.map_name())
                .join(&self.config_file),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.step_length.is_finite() && self.step_length > 0.0) {
            return Err(ConfigError::InvalidStepLength(self.step_length));
        }
        if !(self.stop_speed.is_finite() && self.stop_speed >= 0.0) {
            return Err(ConfigError::InvalidStopSpeed(self.stop_speed));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Green bounds must satisfy 0 < min <= max, got [{min}, {max}]")]
    InvalidGreenBounds { min: i32, max: i32 },
    #[error("Yellow duration must be non-negative, got {0}")]
    InvalidYellow(i32),
    #[error("Population size must be at least 2")]
    PopulationTooSmall,
    #[error("Generation count must be positive")]
    NoGenerations,
    #[error("Elite count {elite_count} must be between 2 and the population size {population_size}")]
    InvalidEliteCount {
        elite_count: usize,
        population_size: usize,
    },
    #[error("Mutation standard deviation must be finite and non-negative, got {0}")]
    InvalidMutationStd(f64),
    #[error("Mutation rate out of range: {0}")]
    InvalidMutationRate(f64),
    #[error("Fitness alpha must be finite, got {0}")]
    InvalidAlpha(f64),
    #[error("Horizon must be at least one step")]
    InvalidHorizon,
    #[error("Traffic light id must not be empty")]
    MissingTrafficLight,
    #[error("Step length must be positive, got {0}")]
    InvalidStepLength(f64),
    #[error("Stop speed must be non-negative, got {0}")]
    InvalidStopSpeed(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = TuningConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bounds(), GreenBounds::new(10, 80));
    }

    #[test]
    fn test_serialization() {
        let config = TuningConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: TuningConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.population_size, config.population_size);
        assert_eq!(parsed.strategy, config.strategy);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: TuningConfig = serde_json::from_str(
            r#"{"tls_id": "0", "population_size": 10, "generations": 8,
                "strategy": {"type": "RandomReset"},
                "scenario": {"backend": "queue", "config_path": "scenario.json"}}"#,
        )
        .unwrap();
        assert_eq!(parsed.tls_id, "0");
        assert_eq!(parsed.elite_count, 4);
        assert_eq!(
            parsed.strategy,
            SearchStrategy::RandomReset {
                mutation_percent_genes: 50.0
            }
        );
        assert_eq!(parsed.scenario.backend, Backend::Queue);
        assert_eq!(
            parsed.scenario.resolved_config_path(),
            PathBuf::from("scenario.json")
        );
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_elite_count_validation() {
        let config = TuningConfig {
            elite_count: 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEliteCount { .. })
        ));

        let config = TuningConfig {
            elite_count: 13,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_bounds() {
        let config = TuningConfig {
            green_min: 50,
            green_max: 40,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidGreenBounds { min: 50, max: 40 })
        );
    }

    #[test]
    fn test_map_layout() {
        let scenario = ScenarioConfig {
            root: PathBuf::from("/repo"),
            map: Some("downtown".to_string()),
            ..Default::default()
        };
        assert_eq!(
            scenario.resolved_config_path(),
            PathBuf::from("/repo/sumo_data/downtown/Traci.sumocfg")
        );
    }
}
