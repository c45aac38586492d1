//! Demo model evolving random strings toward a fixed target text.

use crate::config::{ConfigError, TargetConfig};
use crate::evolution::{is_self_breed, ModelResult, OrganismModel};
use crate::rng::{Prng, RandomSource};

/// Chance that a self-bred child receives one point mutation
const SELF_BREED_MUTATION_RATE: f64 = 0.9;
/// Per-locus chance of inheriting from the first parent
const FIRST_PARENT_RATE: f64 = 0.45;
/// Per-locus chance of inheriting from either parent; the rest mutates
const EITHER_PARENT_RATE: f64 = 0.9;

/// Organisms are byte strings of the target's length, scored by their summed
/// character distance to the target.
#[derive(Debug, Clone)]
pub struct TargetStringModel {
    target: Vec<u8>,
    alphabet: Vec<u8>,
}

impl TargetStringModel {
    pub fn new(target: &str, alphabet: &str) -> Result<Self, ConfigError> {
        let config = TargetConfig {
            text: target.to_string(),
            alphabet: alphabet.to_string(),
        };
        Self::from_config(&config)
    }

    pub fn from_config(config: &TargetConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            target: config.text.as_bytes().to_vec(),
            alphabet: config.alphabet.as_bytes().to_vec(),
        })
    }

    pub fn target(&self) -> &[u8] {
        &self.target
    }

    fn random_char(&self, rng: &mut Prng) -> ModelResult<u8> {
        Ok(*rng.choose(&self.alphabet).ok_or("empty alphabet")?)
    }
}

impl OrganismModel for TargetStringModel {
    type Organism = Vec<u8>;

    fn generate(&self, _index: usize, rng: &mut Prng) -> ModelResult<Vec<u8>> {
        (0..self.target.len())
            .map(|_| self.random_char(rng))
            .collect()
    }

    fn breed(&self, a: &Vec<u8>, b: &Vec<u8>, child: &mut Vec<u8>, rng: &mut Prng) -> ModelResult<()> {
        child.clear();

        if is_self_breed(a, b) {
            child.extend_from_slice(a);
            if rng.maybe(SELF_BREED_MUTATION_RATE) {
                if let Some(locus) = rng.index(child.len()) {
                    child[locus] = self.random_char(rng)?;
                }
            }
            return Ok(());
        }

        for (&from_a, &from_b) in a.iter().zip(b.iter()) {
            let roll = rng.float();
            let gene = if roll < FIRST_PARENT_RATE {
                from_a
            } else if roll < EITHER_PARENT_RATE {
                from_b
            } else {
                self.random_char(rng)?
            };
            child.push(gene);
        }
        Ok(())
    }

    fn score(&self, organism: &Vec<u8>, _worker: usize, _rng: &mut Prng) -> ModelResult<f64> {
        let distance: u32 = self
            .target
            .iter()
            .zip(organism.iter())
            .map(|(&t, &o)| u32::from(t.abs_diff(o)))
            .sum();
        Ok(-f64::from(distance))
    }

    fn accept(
        &self,
        _organism: &Vec<u8>,
        score: f64,
        _generations: usize,
        _worker: usize,
        _rng: &mut Prng,
    ) -> ModelResult<bool> {
        Ok(score >= 0.0)
    }
}
