//! # NEURANIM
//!
//! Neuroevolution of walking creatures: fixed-topology neural controllers
//! trained by truncation selection, mutation and crossover.
//!
//! ## Features
//!
//! - **Symmetric**: one controller drives both walking directions by mirroring
//!   sensors and actuators
//! - **Parallel**: trials run on all CPU cores via Rayon
//! - **Resumable**: populations are saved as plain-text generation files
//! - **Configurable**: YAML configuration files
//! - **Reproducible**: seeded random number generation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use neuranim::{Config, Population, SandboxEnv, TrialEvaluator, TrialRunner};
//!
//! let config = Config::default();
//! let mut population = Population::from_config(&config, 42).unwrap();
//! let evaluator = TrialEvaluator::new(TrialRunner::new(config.trial.settings()), SandboxEnv::new);
//!
//! population.advance_generation(&evaluator).unwrap();
//! println!("{}", population.history().latest().unwrap().summary());
//! ```
//!
//! ## Checkpoints
//!
//! ```rust,no_run
//! use neuranim::checkpoint::{self, CheckpointManager};
//! use neuranim::{Config, Population, PopulationSettings};
//!
//! let config = Config::default();
//! let registry = config.registry().unwrap();
//! let saved = checkpoint::load("run/gen10.txt", &registry).unwrap();
//! let population = Population::restore(saved, PopulationSettings::default()).unwrap();
//! ```

pub mod checkpoint;
pub mod config;
pub mod environment;
pub mod error;
pub mod evolution;
pub mod individual;
pub mod inspect;
pub mod morphology;
pub mod neural;
pub mod population;
pub mod stats;
pub mod trial;

// Re-export main types
pub use config::Config;
pub use environment::{Environment, Observation, SandboxEnv, TaskParams, Vec2};
pub use error::{Error, Result};
pub use individual::{Individual, IndividualId};
pub use morphology::{Morphology, MorphologyRegistry};
pub use neural::{Activation, NeuralNet};
pub use population::{Population, PopulationSettings, PopulationState, StopHandle};
pub use trial::{Evaluator, TrialEvaluator, TrialRunner, TrialSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a quick benchmark on the sandbox environment
pub fn benchmark(generations: u32, population: usize) -> Result<BenchmarkResult> {
    use std::time::Instant;

    let mut config = Config::default();
    config.population.size = population;
    config.population.survivors = evolution::SurvivorCount::Fraction(0.1);
    config.trial.max_steps = 200;

    let mut pool = Population::from_config(&config, 0)?;
    let evaluator = TrialEvaluator::new(TrialRunner::new(config.trial.settings()), SandboxEnv::new);

    let start = Instant::now();
    for _ in 0..generations {
        pool.advance_generation(&evaluator)?;
    }
    let elapsed = start.elapsed().as_secs_f64();

    let trials = u64::from(generations) * population as u64;
    Ok(BenchmarkResult {
        generations,
        population,
        trials,
        elapsed_secs: elapsed,
        trials_per_second: trials as f64 / elapsed.max(f64::EPSILON),
        best_score: pool.history().best_ever().map(|s| s.best),
    })
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub generations: u32,
    pub population: usize,
    pub trials: u64,
    pub elapsed_secs: f64,
    pub trials_per_second: f64,
    pub best_score: Option<f64>,
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Benchmark Results ===")?;
        writeln!(f, "Generations: {}", self.generations)?;
        writeln!(f, "Population: {}", self.population)?;
        writeln!(f, "Time: {:.3}s", self.elapsed_secs)?;
        writeln!(f, "Speed: {:.1} trials/s", self.trials_per_second)?;
        match self.best_score {
            Some(best) => writeln!(f, "Best score: {:.3}", best)?,
            None => writeln!(f, "Best score: n/a")?,
        }
        Ok(())
    }
}
