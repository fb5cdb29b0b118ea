//! Weight mutation with synapse pruning.

use super::network::NeuralNet;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Configuration for mutation operations
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Expected number of replaced weights per call (scaled by synapse count)
    pub frequency: f64,
    /// Replacements with a magnitude below this silence the synapse for good
    pub prune_threshold: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            frequency: 2.0,
            prune_threshold: 0.02,
        }
    }
}

impl MutationConfig {
    /// Per-weight replacement probability for a network with `total_synapses` synapses.
    /// A non-finite frequency disables mutation.
    pub fn probability(&self, total_synapses: usize) -> f64 {
        if total_synapses == 0 || !self.frequency.is_finite() {
            return 0.0;
        }
        (self.frequency / total_synapses as f64).clamp(0.0, 1.0)
    }
}

impl NeuralNet {
    /// Mutate with the default prune threshold. Returns the number of weights changed.
    pub fn mutate<R: Rng + ?Sized>(&mut self, frequency: f64, rng: &mut R) -> usize {
        self.mutate_with(
            &MutationConfig {
                frequency,
                ..MutationConfig::default()
            },
            rng,
        )
    }

    /// Replace each live weight with probability `frequency / total_synapses`.
    ///
    /// Replacements are uniform in `[-1, 1]`; a replacement smaller than the prune
    /// threshold silences the synapse. Silenced synapses are skipped, so they stay
    /// at `0.0` forever.
    pub fn mutate_with<R: Rng + ?Sized>(&mut self, config: &MutationConfig, rng: &mut R) -> usize {
        let p = config.probability(self.total_synapses());
        if p <= 0.0 {
            return 0;
        }

        let mut changed = 0;
        for (weights, enabled) in self.weights.iter_mut().zip(self.enabled.iter_mut()) {
            for (w, on) in weights.iter_mut().zip(enabled.iter_mut()) {
                if !*on || rng.gen::<f64>() >= p {
                    continue;
                }
                let replacement: f64 = rng.gen_range(-1.0..=1.0);
                if replacement.abs() < config.prune_threshold {
                    *w = 0.0;
                    *on = false;
                } else {
                    *w = replacement;
                }
                changed += 1;
            }
        }

        changed
    }

    /// Silence a single synapse
    pub fn disable_synapse(&mut self, layer: usize, row: usize, col: usize) -> bool {
        match (
            self.weights.get_mut(layer).and_then(|w| w.get_mut((row, col))),
            self.enabled.get_mut(layer).and_then(|m| m.get_mut((row, col))),
        ) {
            (Some(w), Some(on)) => {
                *w = 0.0;
                *on = false;
                true
            }
            _ => false,
        }
    }
}
