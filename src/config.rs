//! Configuration for evolution runs.
//!
//! Supports YAML configuration files with sensible defaults.

use crate::environment::Vec2;
use crate::error::{Error, Result};
use crate::evolution::{BreedStrategy, SurvivorCount};
use crate::morphology::{Morphology, MorphologyRegistry};
use crate::neural::{Activation, CrossoverStrategy};
use crate::trial::{ScoreMode, TrialSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub population: PopulationConfig,
    pub evolution: EvolutionConfig,
    pub trial: TrialConfig,
    pub terrain: TerrainConfig,
    pub logging: LoggingConfig,
    /// Extra creature layouts registered next to the built-ins
    pub morphologies: Vec<Morphology>,
}

/// Pool size and controller shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub size: usize,
    /// `{ count: n }` or `{ fraction: f }`
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub survivors: SurvivorCount,
    /// Morphology tag
    pub morphology: String,
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub breeding: BreedStrategy,
}

/// Genetic operator parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Expected number of replaced weights per mutation
    pub mutation_frequency: f64,
    pub prune_threshold: f64,
    pub crossover: CrossoverStrategy,
    /// Run ends after this generation
    pub max_generations: u32,
}

/// Episode parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    pub max_steps: u32,
    pub min_height: f64,
    pub start: Vec2,
    pub target: Vec2,
    /// Targets cycled through one per generation (overrides `target` when non-empty)
    pub targets: Vec<Vec2>,
    pub score_mode: ScoreMode,
    pub posture_penalty: f64,
    pub mirror: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Elevation variation in percent per metre
    pub roughness: f64,
    /// Draw a new terrain seed every generation
    pub vary_per_generation: bool,
}

/// Logging and checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Generations between saves (0 disables)
    pub checkpoint_interval: u32,
    /// Saves kept per population (0 keeps all)
    pub max_checkpoints: usize,
    pub output_dir: PathBuf,
    pub log_level: String,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: 200,
            survivors: SurvivorCount::Count(15),
            morphology: "Boulotron2000".to_string(),
            hidden_layers: vec![30, 30],
            activation: Activation::Tanh,
            breeding: BreedStrategy::Clone,
        }
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            mutation_frequency: 2.0,
            prune_threshold: 0.02,
            crossover: CrossoverStrategy::WholeGene,
            max_generations: 350,
        }
    }
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            max_steps: 500,
            min_height: 0.0,
            start: Vec2::new(-3.0, 3.0),
            target: Vec2::new(35.0, 2.0),
            targets: Vec::new(),
            score_mode: ScoreMode::Final,
            posture_penalty: 0.0,
            mirror: false,
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            roughness: 20.0,
            vary_per_generation: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 10,
            max_checkpoints: 0,
            output_dir: PathBuf::from("run"),
            log_level: "info".to_string(),
        }
    }
}

impl TrialConfig {
    pub fn settings(&self) -> TrialSettings {
        TrialSettings {
            max_steps: self.max_steps,
            min_height: self.min_height,
            score_mode: self.score_mode,
            posture_penalty: self.posture_penalty,
            mirror: self.mirror,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Built-in morphologies plus the ones declared here
    pub fn registry(&self) -> Result<MorphologyRegistry> {
        let mut registry = MorphologyRegistry::with_builtins();
        for m in &self.morphologies {
            registry.register(m.clone())?;
        }
        Ok(registry)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));

        if self.population.size == 0 {
            return invalid("population.size must be > 0");
        }
        let k = self.population.survivors.resolve(self.population.size);
        if k == 0 || k > self.population.size {
            return Err(Error::InvalidConfig(format!(
                "survivors must resolve to 1..={}, got {}",
                self.population.size, k
            )));
        }
        if self.population.hidden_layers.contains(&0) {
            return invalid("hidden layers must not be empty");
        }
        if !(self.evolution.mutation_frequency > 0.0) {
            return invalid("evolution.mutation_frequency must be > 0");
        }
        if !(0.0..1.0).contains(&self.evolution.prune_threshold) {
            return invalid("evolution.prune_threshold must be in [0, 1)");
        }
        if self.trial.max_steps == 0 {
            return invalid("trial.max_steps must be > 0");
        }
        if self.terrain.roughness < 0.0 {
            return invalid("terrain.roughness must be >= 0");
        }

        let registry = self
            .registry()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        registry
            .get(&self.population.morphology)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(())
    }
}
