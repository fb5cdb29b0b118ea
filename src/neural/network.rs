//! Neural network structure and forward propagation.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Activation function applied after every layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Tanh,
    Sigmoid,
    Relu,
}

impl Activation {
    pub const ALL: [Activation; 3] = [Activation::Tanh, Activation::Sigmoid, Activation::Relu];

    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Relu => x.max(0.0),
        }
    }

    /// Closed range of values the function can produce
    pub fn range(self) -> (f64, f64) {
        match self {
            Activation::Tanh => (-1.0, 1.0),
            Activation::Sigmoid => (0.0, 1.0),
            Activation::Relu => (0.0, f64::INFINITY),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Relu => "relu",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        Activation::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or(Error::UnknownActivation(name))
    }
}

/// Activations of every layer captured during a traced forward pass.
///
/// Entry 0 is the input with its bias unit, the last entry is the network output.
pub type Trace = Vec<Array1<f64>>;

/// Feedforward network over an explicit list of weight matrices.
///
/// `weights[i]` has shape `(layers[i] + 1, layers[i + 1])`; the extra row holds
/// the bias weights. `enabled` mirrors `weights` and marks silenced synapses,
/// whose stored weight is always exactly `0.0`.
#[derive(Clone, Debug)]
pub struct NeuralNet {
    pub(super) layers: Vec<usize>,
    pub(super) weights: Vec<Array2<f64>>,
    pub(super) enabled: Vec<Array2<bool>>,
    pub(super) activation: Activation,
}

impl NeuralNet {
    /// Create a network with weights drawn uniformly in `[-1, 1]`
    pub fn random<R: Rng + ?Sized>(
        layers: &[usize],
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        check_layer_sizes(layers)?;

        let weights: Vec<Array2<f64>> = layers
            .windows(2)
            .map(|pair| Array2::from_shape_fn((pair[0] + 1, pair[1]), |_| rng.gen_range(-1.0..=1.0)))
            .collect();

        Ok(Self::with_mask_from_zeros(layers.to_vec(), weights, activation))
    }

    /// Build a network from explicit weight matrices.
    ///
    /// Entries that are exactly `0.0` are treated as silenced synapses.
    pub fn from_weights(weights: Vec<Array2<f64>>, activation: Activation) -> Result<Self> {
        let first = weights.first().ok_or_else(|| {
            Error::InvalidConfig("a network needs at least one weight matrix".to_string())
        })?;
        if first.nrows() == 0 {
            return Err(Error::ShapeMismatch {
                expected: 2,
                found: 0,
            });
        }

        let mut layers = vec![first.nrows() - 1];
        for w in &weights {
            let expected = layers[layers.len() - 1] + 1;
            if w.nrows() != expected {
                return Err(Error::ShapeMismatch {
                    expected,
                    found: w.nrows(),
                });
            }
            layers.push(w.ncols());
        }
        check_layer_sizes(&layers)?;

        Ok(Self::with_mask_from_zeros(layers, weights, activation))
    }

    fn with_mask_from_zeros(
        layers: Vec<usize>,
        weights: Vec<Array2<f64>>,
        activation: Activation,
    ) -> Self {
        let enabled = weights.iter().map(|w| w.mapv(|x| x != 0.0)).collect();
        Self {
            layers,
            weights,
            enabled,
            activation,
        }
    }

    /// Independent deep copy (weights and mask are never shared)
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Forward pass
    pub fn feed(&self, input: &[f64]) -> Result<Vec<f64>> {
        self.propagate(input, None)
    }

    /// Forward pass that also returns every layer's activations.
    ///
    /// The returned output is identical to [`NeuralNet::feed`].
    pub fn feed_traced(&self, input: &[f64]) -> Result<(Vec<f64>, Trace)> {
        let mut trace = Trace::with_capacity(self.layers.len());
        let output = self.propagate(input, Some(&mut trace))?;
        Ok((output, trace))
    }

    fn propagate(&self, input: &[f64], mut trace: Option<&mut Trace>) -> Result<Vec<f64>> {
        if input.len() != self.input_width() {
            return Err(Error::ShapeMismatch {
                expected: self.input_width(),
                found: input.len(),
            });
        }

        let last = self.weights.len() - 1;
        let mut activation = with_bias(input.iter().copied(), input.len());

        for (i, w) in self.weights.iter().enumerate() {
            if let Some(t) = trace.as_deref_mut() {
                t.push(activation.clone());
            }
            let mut next = activation.dot(w);
            next.mapv_inplace(|x| self.activation.apply(x));
            activation = if i < last {
                let n = next.len();
                with_bias(next.iter().copied(), n)
            } else {
                next
            };
        }

        if let Some(t) = trace {
            t.push(activation.clone());
        }

        Ok(activation.to_vec())
    }

    /// Layer sizes from input to output
    #[inline]
    pub fn layer_sizes(&self) -> &[usize] {
        &self.layers
    }

    #[inline]
    pub fn input_width(&self) -> usize {
        self.layers[0]
    }

    #[inline]
    pub fn output_width(&self) -> usize {
        self.layers[self.layers.len() - 1]
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn weights(&self) -> &[Array2<f64>] {
        &self.weights
    }

    /// Sum of all layer sizes (bias units excluded)
    pub fn total_neurons(&self) -> usize {
        total_neurons(&self.layers)
    }

    /// Number of neuron-to-neuron connections (bias rows excluded)
    pub fn total_synapses(&self) -> usize {
        total_synapses(&self.layers)
    }

    /// Number of stored weights including bias rows
    pub fn parameter_count(&self) -> usize {
        self.weights.iter().map(|w| w.len()).sum()
    }

    pub fn is_enabled(&self, layer: usize, row: usize, col: usize) -> bool {
        self.enabled
            .get(layer)
            .and_then(|m| m.get((row, col)))
            .copied()
            .unwrap_or(false)
    }

    /// Number of silenced synapses
    pub fn disabled_count(&self) -> usize {
        self.enabled
            .iter()
            .map(|m| m.iter().filter(|&&e| !e).count())
            .sum()
    }

    /// Check if network is valid (no NaN/Inf, consistent shapes)
    pub fn is_valid(&self) -> bool {
        self.weights.len() + 1 == self.layers.len()
            && self.weights.iter().zip(self.layers.windows(2)).all(|(w, pair)| {
                w.dim() == (pair[0] + 1, pair[1]) && w.iter().all(|x| x.is_finite())
            })
            && self
                .weights
                .iter()
                .zip(&self.enabled)
                .all(|(w, m)| w.iter().zip(m.iter()).all(|(&x, &on)| on || x == 0.0))
    }
}

/// Sum of layer sizes
pub fn total_neurons(layers: &[usize]) -> usize {
    layers.iter().sum()
}

/// Sum of `layers[i] * layers[i + 1]`
pub fn total_synapses(layers: &[usize]) -> usize {
    layers.windows(2).map(|pair| pair[0] * pair[1]).sum()
}

fn check_layer_sizes(layers: &[usize]) -> Result<()> {
    if layers.len() < 2 {
        return Err(Error::InvalidConfig(format!(
            "a network needs input and output layers, got {:?}",
            layers
        )));
    }
    if layers.iter().any(|&n| n == 0) {
        return Err(Error::InvalidConfig(format!(
            "layer sizes must be non-zero, got {:?}",
            layers
        )));
    }
    Ok(())
}

#[inline]
fn with_bias(values: impl Iterator<Item = f64>, len: usize) -> Array1<f64> {
    let mut v = Vec::with_capacity(len + 1);
    v.extend(values);
    v.push(1.0);
    Array1::from(v)
}
