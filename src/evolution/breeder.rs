use crate::config::EngineConfig;
use crate::evolution::population::{score_organism, Population};
use crate::evolution::ring::RingLink;
use crate::evolution::{EngineError, OrganismModel, Stage};
use crate::rng::{Prng, RandomSource};
use log::debug;
use std::time::{Duration, Instant};

/// Rounds between two population refreshes
pub const REFRESH_INTERVAL_ROUNDS: usize = 500;

/// Tweening curve favoring the low end of `[start, end]`, used to pick weak parents
pub fn ease_in_expo(start: f64, end: f64, t: f64) -> f64 {
    (end - start) * 2f64.powf(10.0 * (t - 1.0)) + start
}

/// Tweening curve favoring the high end of `[start, end]`, used to pick strong parents
pub fn ease_out_expo(start: f64, end: f64, t: f64) -> f64 {
    (end - start) * (1.0 - 2f64.powf(-10.0 * t)) + start
}

/// One way of choosing the parents of the next child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Two parents biased toward high fitness
    BestWithBest,
    /// One parent biased toward low fitness, one toward high fitness
    WorstWithBest,
    /// The best organism bred with itself
    AsexualBest,
    /// The ring neighbor's best organism bred with itself
    RingNeighbor,
}

const SOLO_STRATEGIES: [Strategy; 3] = [
    Strategy::BestWithBest,
    Strategy::WorstWithBest,
    Strategy::AsexualBest,
];

const RING_STRATEGIES: [Strategy; 4] = [
    Strategy::BestWithBest,
    Strategy::WorstWithBest,
    Strategy::AsexualBest,
    Strategy::RingNeighbor,
];

/// Why a worker stopped breeding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model accepted the best organism
    Accepted,
    /// The wall-clock budget ran out
    TimeBudget,
    /// Too many breedings passed without a new best
    Stagnated,
    /// Another ring worker finished the run
    RingFinished,
}

/// What a worker hands back once it stops
#[derive(Debug, Clone)]
pub struct WorkerReport<O> {
    pub worker: usize,
    pub best: O,
    pub score: f64,
    pub generations: usize,
    pub stop: StopReason,
}

/// A single breeding loop over its own population and random stream.
pub struct Worker<'a, M: OrganismModel> {
    model: &'a M,
    index: usize,
    rng: Prng,
    population: Population<M::Organism>,
    /// Shell for the next child, recycled from evicted organisms
    child: M::Organism,
    ring: Option<RingLink<'a, M::Organism>>,
    stagnation_limit: Option<usize>,
    generations: usize,
    since_new_best: usize,
}

impl<'a, M: OrganismModel> Worker<'a, M> {
    /// Builds the worker's population and child, publishing the initial best when
    /// part of a ring.
    ///
    /// # Arguments
    /// * `model` - The organism model shared by every worker
    /// * `config` - The run configuration, already validated
    /// * `index` - Position of the worker in the ring, 0 when running alone
    /// * `rng` - The worker's own random stream
    /// * `ring` - The worker's link into the ring, `None` when running alone
    ///
    /// # Returns
    /// * `Result<Worker, EngineError>` - The ready worker, or the first callback failure
    pub fn new(
        model: &'a M,
        config: &EngineConfig,
        index: usize,
        mut rng: Prng,
        ring: Option<RingLink<'a, M::Organism>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        debug!("Worker {}: starting with a {:?} stream", index, rng.kind());
        let population = Population::initialize(model, config.population_size, index, &mut rng)?;
        let child = model
            .generate(0, &mut rng)
            .map_err(|e| EngineError::callback(index, Stage::Generate, e))?;

        if let Some(link) = &ring {
            link.publish(population.best().clone());
        }

        Ok(Self {
            model,
            index,
            rng,
            population,
            child,
            ring,
            stagnation_limit: config.stagnation_limit(),
            generations: 0,
            since_new_best: 0,
        })
    }

    fn strategies(&self) -> &'static [Strategy] {
        if self.ring.is_some() {
            &RING_STRATEGIES
        } else {
            &SOLO_STRATEGIES
        }
    }

    /// Breeds until a stop condition holds.
    ///
    /// The model is asked about the initial best before the first round, so a
    /// population that already holds an acceptable organism finishes at once.
    pub fn run(mut self, time_budget: Option<Duration>) -> Result<WorkerReport<M::Organism>, EngineError> {
        let started = Instant::now();
        let stop = if self.accepts_best()? {
            self.finish_ring();
            StopReason::Accepted
        } else {
            self.evolve(started, time_budget)?
        };
        Ok(self.into_report(stop))
    }

    fn evolve(&mut self, started: Instant, time_budget: Option<Duration>) -> Result<StopReason, EngineError> {
        let per_round = self.strategies().len();

        loop {
            if time_budget.is_some_and(|budget| started.elapsed() >= budget) {
                return Ok(StopReason::TimeBudget);
            }
            if self.ring.as_ref().is_some_and(|link| link.is_finished()) {
                return Ok(StopReason::RingFinished);
            }

            let mut found_new_best = self.breed_round()?;

            self.generations += per_round;
            self.since_new_best += per_round;

            if self.generations % (per_round * REFRESH_INTERVAL_ROUNDS) == 0 {
                found_new_best |= self
                    .population
                    .refresh(self.model, self.generations, self.index, &mut self.rng)?
                    .new_best;
                self.publish_best();
            }

            if found_new_best && self.accepts_best()? {
                self.finish_ring();
                return Ok(StopReason::Accepted);
            }

            if self
                .stagnation_limit
                .is_some_and(|limit| self.since_new_best > limit)
            {
                debug!(
                    "Worker {}: no new best in {} generations, stopping",
                    self.index, self.since_new_best
                );
                self.finish_ring();
                return Ok(StopReason::Stagnated);
            }
        }
    }

    /// Runs every strategy once, returning whether any child became the new best.
    fn breed_round(&mut self) -> Result<bool, EngineError> {
        let mut found_new_best = false;

        for &strategy in self.strategies() {
            if !self.breed_child(strategy)? {
                continue;
            }

            let score = score_organism(self.model, &self.child, self.index, &mut self.rng)?;
            let submission = self.population.submit(&mut self.child, score);
            if submission.new_best {
                found_new_best = true;
                self.since_new_best = 0;
                debug!(
                    "Worker {}: new best {:.4} via {:?} after {} generations",
                    self.index, score, strategy, self.generations
                );
                self.publish_best();
            }
        }

        Ok(found_new_best)
    }

    /// Fills the child according to `strategy`; `false` when the strategy had nothing
    /// to breed from.
    fn breed_child(&mut self, strategy: Strategy) -> Result<bool, EngineError> {
        let last = self.population.len() - 1;
        let (a, b) = match strategy {
            Strategy::BestWithBest => (
                eased_index(&mut self.rng, ease_out_expo, 0.25, 1.0, last),
                eased_index(&mut self.rng, ease_out_expo, 0.25, 1.0, last),
            ),
            Strategy::WorstWithBest => (
                eased_index(&mut self.rng, ease_in_expo, 0.0, 0.75, last),
                eased_index(&mut self.rng, ease_out_expo, 0.25, 1.0, last),
            ),
            Strategy::AsexualBest => (last, last),
            Strategy::RingNeighbor => {
                let Some(neighbor) = self.ring.as_ref().and_then(|link| link.neighbor_best()) else {
                    return Ok(false);
                };
                self.model
                    .breed(&neighbor, &neighbor, &mut self.child, &mut self.rng)
                    .map_err(|e| EngineError::callback(self.index, Stage::Breed, e))?;
                return Ok(true);
            }
        };

        self.model
            .breed(
                self.population.get(a),
                self.population.get(b),
                &mut self.child,
                &mut self.rng,
            )
            .map_err(|e| EngineError::callback(self.index, Stage::Breed, e))?;
        Ok(true)
    }

    fn accepts_best(&mut self) -> Result<bool, EngineError> {
        self.model
            .accept(
                self.population.best(),
                self.population.best_score(),
                self.generations,
                self.index,
                &mut self.rng,
            )
            .map_err(|e| EngineError::callback(self.index, Stage::Accept, e))
    }

    fn publish_best(&self) {
        if let Some(link) = &self.ring {
            link.publish(self.population.best().clone());
        }
    }

    fn finish_ring(&self) {
        if let Some(link) = &self.ring {
            link.signal_finished();
        }
    }

    fn into_report(self, stop: StopReason) -> WorkerReport<M::Organism> {
        let score = self.population.best_score();
        let best = self.population.best().clone();
        WorkerReport {
            worker: self.index,
            best,
            score,
            generations: self.generations,
            stop,
        }
    }
}

/// Maps a uniform draw through `ease` onto a population index in `[0, last]`.
fn eased_index(
    rng: &mut Prng,
    ease: fn(f64, f64, f64) -> f64,
    start: f64,
    end: f64,
    last: usize,
) -> usize {
    let position = ease(start, end, rng.float()) * last as f64;
    (position as usize).min(last)
}
