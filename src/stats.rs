//! Per-generation statistics.

use crate::error::Result;
use crate::individual::Individual;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Statistics snapshot for one generation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: u32,
    /// Individuals with a score
    pub evaluated: usize,
    /// Trials that ended in an error
    pub failed: usize,
    /// Mean over finite scores
    #[serde(deserialize_with = "nullable_f64")]
    pub mean: f64,
    #[serde(deserialize_with = "nullable_f64")]
    pub best: f64,
    /// Worst finite score
    #[serde(deserialize_with = "nullable_f64")]
    pub worst: f64,
    /// Score of the last survivor
    pub survivor_cutoff: Option<f64>,
    /// Weights changed while breeding the next generation
    pub mutations: usize,
}

/// JSON has no NaN; serde_json writes it as `null`
fn nullable_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NAN))
}

impl GenerationStats {
    pub fn new(generation: u32) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    /// Recompute score aggregates from an evaluated pool
    pub fn update(&mut self, pool: &[Individual]) {
        let scores: Vec<f64> = pool.iter().filter_map(|i| i.score()).collect();
        self.evaluated = scores.len();

        let finite: Vec<f64> = scores.into_iter().filter(|s| s.is_finite()).collect();
        if finite.is_empty() {
            self.mean = f64::NAN;
            self.best = f64::NAN;
            self.worst = f64::NAN;
            return;
        }

        self.mean = finite.iter().sum::<f64>() / finite.len() as f64;
        self.best = finite.iter().copied().fold(f64::INFINITY, f64::min);
        self.worst = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    }

    /// Format stats as a one-line summary
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Gen:{:4} | Eval:{:4} | Best:{:8.3} | Mean:{:8.3} | Worst:{:8.3}",
            self.generation, self.evaluated, self.best, self.mean, self.worst
        );
        if let Some(cutoff) = self.survivor_cutoff {
            line.push_str(&format!(" | Cut:{:8.3}", cutoff));
        }
        if self.failed > 0 {
            line.push_str(&format!(" | Failed:{}", self.failed));
        }
        line
    }
}

/// Historical statistics tracker
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsHistory {
    pub snapshots: Vec<GenerationStats>,
}

impl StatsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stats: GenerationStats) {
        self.snapshots.push(stats);
    }

    pub fn latest(&self) -> Option<&GenerationStats> {
        self.snapshots.last()
    }

    /// Best score over time
    pub fn best_series(&self) -> Vec<(u32, f64)> {
        self.snapshots.iter().map(|s| (s.generation, s.best)).collect()
    }

    /// Mean score over time
    pub fn mean_series(&self) -> Vec<(u32, f64)> {
        self.snapshots.iter().map(|s| (s.generation, s.mean)).collect()
    }

    /// Lowest best score across all generations
    pub fn best_ever(&self) -> Option<&GenerationStats> {
        self.snapshots
            .iter()
            .filter(|s| s.best.is_finite())
            .min_by(|a, b| a.best.total_cmp(&b.best))
    }

    /// Compact JSON blob stored in population files
    pub fn to_blob(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_blob(blob: &str) -> Result<Self> {
        Ok(serde_json::from_str(blob)?)
    }

    /// Save history to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
