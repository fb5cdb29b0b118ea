//! Ranking, truncation selection and breeding.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::individual::{Individual, IndividualId};
use crate::neural::{CrossoverStrategy, MutationConfig};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How many individuals survive selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurvivorCount {
    Count(usize),
    /// Share of the ranked pool, rounded to the nearest individual
    Fraction(f64),
}

impl Default for SurvivorCount {
    fn default() -> Self {
        SurvivorCount::Count(15)
    }
}

impl SurvivorCount {
    pub fn resolve(&self, pool: usize) -> usize {
        match *self {
            SurvivorCount::Count(k) => k,
            SurvivorCount::Fraction(f) => (pool as f64 * f).round().max(0.0) as usize,
        }
    }
}

/// Survivor index pairs in breeding order: `(0, 1), (0, 2), .., (1, 2), ..`
pub fn survivor_pairs(survivors: usize) -> Vec<(usize, usize)> {
    (0..survivors)
        .flat_map(|a| (a + 1..survivors).map(move |b| (a, b)))
        .collect()
}

/// How the pool is refilled from the survivors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreedStrategy {
    /// Mutated copies of each survivor
    #[default]
    Clone,
    /// Mutated offspring of every survivor pair, cycling until the pool is full
    Crossover,
}

/// Sort ascending by score; unscored individuals go last
pub fn rank(pool: &mut [Individual]) {
    pool.sort_by(|a, b| {
        let sa = a.score().unwrap_or(f64::INFINITY);
        let sb = b.score().unwrap_or(f64::INFINITY);
        sa.total_cmp(&sb)
    });
}

/// Keep the `k` best individuals of `pool`.
///
/// `k` larger than the pool keeps everyone. Zero survivors or an empty pool is
/// [`Error::EmptyPopulation`].
pub fn select(mut pool: Vec<Individual>, k: usize) -> Result<Vec<Individual>> {
    if k == 0 || pool.is_empty() {
        return Err(Error::EmptyPopulation);
    }
    rank(&mut pool);
    pool.truncate(k);
    Ok(pool)
}

/// Number of clones each ranked survivor contributes when refilling to `target`.
///
/// Every survivor gets `(target - k) / k` clones and the fittest
/// `(target - k) % k` survivors one more.
pub fn clone_counts(survivors: usize, target: usize) -> Vec<usize> {
    if survivors == 0 || survivors >= target {
        return vec![0; survivors];
    }
    let extra = target - survivors;
    let (base, rem) = (extra / survivors, extra % survivors);
    (0..survivors).map(|i| base + usize::from(i < rem)).collect()
}

/// Result of one breeding pass
#[derive(Debug)]
pub struct Brood {
    pub pool: Vec<Individual>,
    /// Weights changed by mutation across all offspring
    pub mutations: usize,
}

/// Genetic operators applied between generations
#[derive(Debug, Clone, Default)]
pub struct EvolutionEngine {
    pub mutation: MutationConfig,
    pub strategy: BreedStrategy,
    pub crossover: CrossoverStrategy,
}

impl EvolutionEngine {
    /// Create evolution engine from config
    pub fn from_config(config: &Config) -> Self {
        Self {
            mutation: MutationConfig {
                frequency: config.evolution.mutation_frequency,
                prune_threshold: config.evolution.prune_threshold,
            },
            strategy: config.population.breeding,
            crossover: config.evolution.crossover,
        }
    }

    /// Refill to `target` individuals from ranked survivors.
    ///
    /// Survivors are kept unmutated at the front of the new pool. Offspring get
    /// fresh ids from `next_id`. All randomness is drawn from `rng` in survivor
    /// rank order.
    pub fn breed<R: Rng + ?Sized>(
        &self,
        mut survivors: Vec<Individual>,
        target: usize,
        next_id: &mut u64,
        rng: &mut R,
    ) -> Result<Brood> {
        if survivors.is_empty() {
            return Err(Error::EmptyPopulation);
        }
        if survivors.len() >= target {
            survivors.truncate(target);
            return Ok(Brood {
                pool: survivors,
                mutations: 0,
            });
        }

        let k = survivors.len();
        let mut offspring = Vec::with_capacity(target - k);
        let mut mutations = 0;
        let mut fresh_id = || {
            let id = IndividualId(*next_id);
            *next_id += 1;
            id
        };

        let pairs = match self.strategy {
            BreedStrategy::Crossover => survivor_pairs(k),
            BreedStrategy::Clone => Vec::new(),
        };

        if pairs.is_empty() {
            for (parent, count) in survivors.iter().zip(clone_counts(k, target)) {
                for _ in 0..count {
                    let mut child = parent.clone_as(fresh_id());
                    mutations += child.brain_mut().mutate_with(&self.mutation, rng);
                    offspring.push(child);
                }
            }
        } else {
            for &(i, j) in pairs.iter().cycle().take(target - k) {
                let (a, b) = (&survivors[i], &survivors[j]);
                let mut brain = a
                    .brain()
                    .crossover_with_strategy(b.brain(), self.crossover, rng)?;
                mutations += brain.mutate_with(&self.mutation, rng);
                offspring.push(a.with_brain(fresh_id(), brain)?);
            }
        }

        survivors.extend(offspring);
        Ok(Brood {
            pool: survivors,
            mutations,
        })
    }
}
