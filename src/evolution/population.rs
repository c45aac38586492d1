use crate::config::{ConfigError, MIN_POPULATION_SIZE};
use crate::evolution::{EngineError, OrganismModel, Stage};
use crate::rng::Prng;
use log::debug;

/// Number of slots below the insertion point that get shuffled down when a child is
/// admitted. The organism falling off the start of the window is evicted.
pub const REPLACEMENT_WINDOW: usize = 2;

/// Outcome of offering a child to the population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Submission {
    /// The child now occupies a slot; the caller's child holds the evicted organism
    pub inserted: bool,
    /// The child beat the previous best score
    pub new_best: bool,
}

/// A fixed-size population kept sorted by ascending score.
///
/// Index `len() - 1` always holds the best organism and index `0` the worst, so the
/// breeding loop never has to search for either.
#[derive(Debug, Clone)]
pub struct Population<O> {
    organisms: Vec<O>,
    scores: Vec<f64>,
}

impl<O> Population<O> {
    /// Builds a population from already scored organisms, sorting them ascending.
    ///
    /// The sort is stable, organisms with equal scores keep their relative order.
    ///
    /// # Arguments
    /// * `organisms` - The organisms, in generation order
    /// * `scores` - One score per organism
    ///
    /// # Returns
    /// * `Result<Self, ConfigError>` - The sorted population, or an error when the
    ///   lengths differ or fewer than 2 organisms are given
    pub fn from_unsorted(organisms: Vec<O>, scores: Vec<f64>) -> Result<Self, ConfigError> {
        if organisms.len() != scores.len() {
            return Err(ConfigError::ScoreCountMismatch {
                organisms: organisms.len(),
                scores: scores.len(),
            });
        }
        if organisms.len() < MIN_POPULATION_SIZE {
            return Err(ConfigError::PopulationTooSmall(organisms.len()));
        }
        let mut population = Self { organisms, scores };
        population.sort();
        Ok(population)
    }

    /// Generates, adjusts and scores `size` organisms with the given model.
    ///
    /// # Arguments
    /// * `model` - The organism model supplying every callback
    /// * `size` - Number of organisms to keep, at least 2
    /// * `worker` - Index of the worker that owns this population
    /// * `rng` - The worker's random stream
    ///
    /// # Returns
    /// * `Result<Population, EngineError>` - The sorted population, or the first callback failure
    pub fn initialize<M>(
        model: &M,
        size: usize,
        worker: usize,
        rng: &mut Prng,
    ) -> Result<Self, EngineError>
    where
        M: OrganismModel<Organism = O>,
    {
        if size < MIN_POPULATION_SIZE {
            return Err(ConfigError::PopulationTooSmall(size).into());
        }
        let mut organisms = Vec::with_capacity(size);
        for index in 0..size {
            let organism = model
                .generate(index, rng)
                .map_err(|e| EngineError::callback(worker, Stage::Generate, e))?;
            organisms.push(organism);
        }

        let mut scores = vec![0.0; size];
        model
            .adjust(&mut organisms, &mut scores, 0, rng)
            .map_err(|e| EngineError::callback(worker, Stage::Adjust, e))?;

        for (organism, score) in organisms.iter().zip(scores.iter_mut()) {
            *score = score_organism(model, organism, worker, rng)?;
        }

        Ok(Self::from_unsorted(organisms, scores)?)
    }

    /// Offers a child to the population.
    ///
    /// Children not strictly better than the worst organism are rejected and `child`
    /// is left untouched. Otherwise the child lands just below any organism with an
    /// equal score, the `REPLACEMENT_WINDOW` slots under it shift down by one and the
    /// organism that falls off the window is swapped back into `child` for reuse.
    ///
    /// # Arguments
    /// * `child` - The candidate; holds the evicted organism on return when inserted
    /// * `score` - The candidate's score
    ///
    /// # Returns
    /// * `Submission` - Whether the child was inserted and whether it is the new best
    pub fn submit(&mut self, child: &mut O, score: f64) -> Submission {
        if score.is_nan() || score <= self.scores[0] {
            return Submission::default();
        }

        let previous_best = self.best_score();
        // first score not below the child; the worst slot is below it so pos >= 1
        let pos = self.scores.partition_point(|s| *s < score);
        let slot = pos - 1;
        let window_start = slot.saturating_sub(REPLACEMENT_WINDOW);

        self.organisms[window_start..=slot].rotate_left(1);
        self.scores[window_start..=slot].rotate_left(1);
        std::mem::swap(&mut self.organisms[slot], child);
        self.scores[slot] = score;

        Submission {
            inserted: true,
            new_best: score > previous_best,
        }
    }

    /// Runs the model's `adjust` hook, re-scores every organism and sorts again.
    ///
    /// Always reports a new best so the caller re-checks its stop condition.
    pub fn refresh<M>(
        &mut self,
        model: &M,
        generations: usize,
        worker: usize,
        rng: &mut Prng,
    ) -> Result<Submission, EngineError>
    where
        M: OrganismModel<Organism = O>,
    {
        model
            .adjust(&mut self.organisms, &mut self.scores, generations, rng)
            .map_err(|e| EngineError::callback(worker, Stage::Adjust, e))?;

        for (organism, score) in self.organisms.iter().zip(self.scores.iter_mut()) {
            *score = score_organism(model, organism, worker, rng)?;
        }
        self.sort();
        debug!(
            "Worker {}: population refreshed after {} generations, best score {:.4}",
            worker,
            generations,
            self.best_score()
        );

        Ok(Submission {
            inserted: false,
            new_best: true,
        })
    }

    fn sort(&mut self) {
        let organisms = std::mem::take(&mut self.organisms);
        let scores = std::mem::take(&mut self.scores);
        let mut paired: Vec<(f64, O)> = scores.into_iter().zip(organisms).collect();
        paired.sort_by(|a, b| a.0.total_cmp(&b.0));
        (self.scores, self.organisms) = paired.into_iter().unzip();
    }

    pub fn len(&self) -> usize {
        self.organisms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organisms.is_empty()
    }

    pub fn get(&self, index: usize) -> &O {
        &self.organisms[index]
    }

    pub fn best(&self) -> &O {
        &self.organisms[self.organisms.len() - 1]
    }

    pub fn best_score(&self) -> f64 {
        self.scores[self.scores.len() - 1]
    }

    pub fn worst_score(&self) -> f64 {
        self.scores[0]
    }

    pub fn organisms(&self) -> &[O] {
        &self.organisms
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }
}

/// Scores one organism, treating a NaN score as a callback failure.
pub(crate) fn score_organism<M: OrganismModel>(
    model: &M,
    organism: &M::Organism,
    worker: usize,
    rng: &mut Prng,
) -> Result<f64, EngineError> {
    let score = model
        .score(organism, worker, rng)
        .map_err(|e| EngineError::callback(worker, Stage::Score, e))?;
    if score.is_nan() {
        return Err(EngineError::NanScore { worker });
    }
    Ok(score)
}
