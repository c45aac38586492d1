pub mod breeder;
pub mod population;
pub mod ring;

use crate::config::{ConfigError, EngineConfig};
use crate::evolution::breeder::Worker;
use crate::rng::{seed_hash, Prng};
use log::info;
use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Result type of every model callback
pub type ModelResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// The problem-specific half of a genetic run.
///
/// The engine owns selection, insertion and scheduling; the model decides what an
/// organism is, how two of them produce a child and how good a child is. One model
/// instance is shared by every worker of a ring run, hence the `Sync` bound.
pub trait OrganismModel: Sync {
    type Organism: Clone + Send + Sync;

    /// Creates the `index`-th organism of a fresh population.
    fn generate(&self, index: usize, rng: &mut Prng) -> ModelResult<Self::Organism>;

    /// Overwrites `child` with the offspring of `a` and `b`.
    ///
    /// `a` and `b` may be the same organism, see [`is_self_breed`]. `child` holds
    /// whatever organism was last evicted and can be reused as scratch space.
    fn breed(
        &self,
        a: &Self::Organism,
        b: &Self::Organism,
        child: &mut Self::Organism,
        rng: &mut Prng,
    ) -> ModelResult<()>;

    /// Fitness of an organism, higher is better. NaN is treated as a failure.
    fn score(&self, organism: &Self::Organism, worker: usize, rng: &mut Prng) -> ModelResult<f64>;

    /// Whether `organism` is good enough to end the run.
    fn accept(
        &self,
        organism: &Self::Organism,
        score: f64,
        generations: usize,
        worker: usize,
        rng: &mut Prng,
    ) -> ModelResult<bool>;

    /// Hook run on the whole population at start-up and on every refresh. The
    /// population is re-scored and re-sorted afterwards, so any edit is allowed.
    fn adjust(
        &self,
        _population: &mut [Self::Organism],
        _scores: &mut [f64],
        _generations: usize,
        _rng: &mut Prng,
    ) -> ModelResult<()> {
        Ok(())
    }
}

/// True when a breed call received the same organism as both parents
pub fn is_self_breed<O>(a: &O, b: &O) -> bool {
    std::ptr::eq(a, b)
}

/// The callback in which a model failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generate,
    Breed,
    Score,
    Accept,
    Adjust,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Generate => "generate",
            Stage::Breed => "breed",
            Stage::Score => "score",
            Stage::Accept => "accept",
            Stage::Adjust => "adjust",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Worker {worker}: {stage} callback failed: {source}")]
    Callback {
        worker: usize,
        stage: Stage,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Worker {worker}: score callback returned NaN")]
    NanScore { worker: usize },
    #[error("Worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },
    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("A ring needs at least 2 workers, got {0}")]
    RingTooSmall(usize),
    #[error("{failed} of {workers} ring workers failed, first failure: {first}")]
    Ring {
        failed: usize,
        workers: usize,
        first: Box<EngineError>,
    },
}

impl EngineError {
    pub(crate) fn callback(
        worker: usize,
        stage: Stage,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        EngineError::Callback {
            worker,
            stage,
            source,
        }
    }
}

/// The result of a finished run
#[derive(Debug, Clone)]
pub struct RunOutcome<O> {
    pub best: O,
    pub score: f64,
    /// Breedings performed, summed over every worker
    pub generations: usize,
    pub elapsed: Duration,
}

/// Entry point of the engine, pairing a model with its run configuration.
pub struct Engine<M: OrganismModel> {
    model: M,
    config: EngineConfig,
}

impl<M: OrganismModel> Engine<M> {
    /// Creates a new engine, rejecting configurations it cannot run.
    ///
    /// # Arguments
    /// * `model` - The problem-specific callbacks
    /// * `config` - The run configuration
    ///
    /// # Returns
    /// * `Result<Self, EngineError>` - The engine, or `EngineError::Config`
    pub fn new(model: M, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { model, config })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evolves one population on the calling thread.
    ///
    /// # Arguments
    /// * `time_budget` - Wall-clock budget, `None` for unbounded
    ///
    /// # Returns
    /// * `Result<RunOutcome, EngineError>` - The best organism found, or the first callback failure
    pub fn run_single(
        &self,
        time_budget: Option<Duration>,
    ) -> Result<RunOutcome<M::Organism>, EngineError> {
        let started = Instant::now();
        info!(
            "Starting single run, population {}",
            self.config.population_size
        );

        let rng = Prng::for_worker(self.config.rng, self.base_seed(), 0);
        let report = Worker::new(&self.model, &self.config, 0, rng, None)?.run(time_budget)?;

        let elapsed = started.elapsed();
        info!(
            "Done in {}ms and {} generations ({:?}, best {:.4})",
            elapsed.as_millis(),
            report.generations,
            report.stop,
            report.score
        );

        Ok(RunOutcome {
            best: report.best,
            score: report.score,
            generations: report.generations,
            elapsed,
        })
    }

    /// Evolves `workers` populations in parallel as a ring.
    ///
    /// `workers == 0` uses the available hardware parallelism and `workers == 1`
    /// behaves exactly like [`Engine::run_single`].
    pub fn run_many(
        &self,
        time_budget: Option<Duration>,
        workers: usize,
    ) -> Result<RunOutcome<M::Organism>, EngineError> {
        let workers = match workers {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        };
        if workers == 1 {
            return self.run_single(time_budget);
        }
        ring::run_ring(
            &self.model,
            &self.config,
            self.base_seed(),
            time_budget,
            workers,
        )
    }

    fn base_seed(&self) -> u64 {
        match &self.config.seed {
            Some(seed) => u64::from(seed_hash(seed)),
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default(),
        }
    }
}
