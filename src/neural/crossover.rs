//! Genetic crossover between neural networks.

use super::network::NeuralNet;
use crate::error::{Error, Result};
use ndarray::{s, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Strategy for crossover operations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverStrategy {
    /// Inherit every incoming weight of a neuron (one matrix column) from one parent
    #[default]
    WholeGene,
    /// Pick each weight from either parent independently
    Uniform,
}

impl NeuralNet {
    /// Whole-gene crossover with another network of the same shape
    pub fn crossover<R: Rng + ?Sized>(&self, other: &Self, rng: &mut R) -> Result<Self> {
        self.crossover_with_strategy(other, CrossoverStrategy::WholeGene, rng)
    }

    /// Crossover with specified strategy
    pub fn crossover_with_strategy<R: Rng + ?Sized>(
        &self,
        other: &Self,
        strategy: CrossoverStrategy,
        rng: &mut R,
    ) -> Result<Self> {
        self.check_compatible(other)?;

        let mut child = self.clone();
        for (layer, (weights, enabled)) in child
            .weights
            .iter_mut()
            .zip(child.enabled.iter_mut())
            .enumerate()
        {
            let donor_w = &other.weights[layer];
            let donor_m = &other.enabled[layer];
            match strategy {
                CrossoverStrategy::WholeGene => {
                    for col in 0..weights.ncols() {
                        if rng.gen_bool(0.5) {
                            weights.slice_mut(s![.., col]).assign(&donor_w.slice(s![.., col]));
                            enabled.slice_mut(s![.., col]).assign(&donor_m.slice(s![.., col]));
                        }
                    }
                }
                CrossoverStrategy::Uniform => {
                    uniform_mix(weights, enabled, donor_w, donor_m, rng);
                }
            }
        }

        Ok(child)
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.layers == other.layers {
            return Ok(());
        }
        let mismatch = self
            .layers
            .iter()
            .zip(&other.layers)
            .find(|(a, b)| a != b)
            .map(|(&a, &b)| (a, b))
            .unwrap_or((self.layers.len(), other.layers.len()));
        Err(Error::ShapeMismatch {
            expected: mismatch.0,
            found: mismatch.1,
        })
    }
}

fn uniform_mix<R: Rng + ?Sized>(
    weights: &mut Array2<f64>,
    enabled: &mut Array2<bool>,
    donor_w: &Array2<f64>,
    donor_m: &Array2<bool>,
    rng: &mut R,
) {
    for ((w, on), (&dw, &dm)) in weights
        .iter_mut()
        .zip(enabled.iter_mut())
        .zip(donor_w.iter().zip(donor_m.iter()))
    {
        if rng.gen_bool(0.5) {
            *w = dw;
            *on = dm;
        }
    }
}
