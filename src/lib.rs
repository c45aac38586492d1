pub mod config;
pub mod evolution;
pub mod rng;
pub mod target;

pub use config::{Config, ConfigError, EngineConfig};
pub use evolution::{Engine, EngineError, ModelResult, OrganismModel, RunOutcome};
pub use rng::{Prng, RandomSource, RngKind};
