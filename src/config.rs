use crate::rng::RngKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Smallest population the sorted insertion scheme can work with
pub const MIN_POPULATION_SIZE: usize = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Population size must be at least 2, got {0}")]
    PopulationTooSmall(usize),
    #[error("Target text must not be empty")]
    EmptyTarget,
    #[error("Alphabet must not be empty")]
    EmptyAlphabet,
    #[error("Target character '{0}' is not part of the alphabet")]
    TargetOutsideAlphabet(char),
    #[error("Only ASCII characters are supported, got '{0}'")]
    NonAscii(char),
    #[error("Expected one score per organism, got {scores} scores for {organisms} organisms")]
    ScoreCountMismatch { organisms: usize, scores: usize },
}

/// Parameters of one evolution run, shared by every worker of the run.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of organisms each worker keeps alive
    pub population_size: usize,
    /// Breedings without a new best before a worker gives up, negative disables it
    pub stagnation_limit: i64,
    /// Which generator backs every worker stream
    pub rng: RngKind,
    /// Seed of the run; absent means seeded from the clock
    pub seed: Option<String>,
    /// Wall-clock budget used by the binary, negative means unbounded
    pub time_budget_ms: i64,
    /// Ring size used by the binary, 0 means available parallelism
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            stagnation_limit: -1,
            rng: RngKind::Lcg,
            seed: None,
            time_budget_ms: -1,
            workers: 0,
        }
    }
}

impl EngineConfig {
    /// Rejects configurations the engine cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size < MIN_POPULATION_SIZE {
            return Err(ConfigError::PopulationTooSmall(self.population_size));
        }
        Ok(())
    }

    /// The stagnation limit, `None` when disabled
    pub fn stagnation_limit(&self) -> Option<usize> {
        usize::try_from(self.stagnation_limit).ok()
    }

    /// The configured time budget, `None` when unbounded
    pub fn time_budget(&self) -> Option<Duration> {
        millis_budget(self.time_budget_ms)
    }
}

/// Converts a millisecond budget where negative means unbounded.
pub fn millis_budget(ms: i64) -> Option<Duration> {
    u64::try_from(ms).ok().map(Duration::from_millis)
}

/// The string the demo binary evolves toward
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub text: String,
    pub alphabet: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            text: "CAT".to_string(),
            alphabet: "ABCDEFGHIJKLMNOPQRSTUVWXYZ".to_string(),
        }
    }
}

impl TargetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.text.is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        if self.alphabet.is_empty() {
            return Err(ConfigError::EmptyAlphabet);
        }
        if let Some(wide) = self.alphabet.chars().find(|c| !c.is_ascii()) {
            return Err(ConfigError::NonAscii(wide));
        }
        if let Some(missing) = self.text.chars().find(|c| !self.alphabet.contains(*c)) {
            return Err(ConfigError::TargetOutsideAlphabet(missing));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub target: TargetConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.target.validate()
    }
}
