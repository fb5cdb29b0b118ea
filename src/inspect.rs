//! Read-only helpers for drawing a controller.
//!
//! Nothing here mutates a network; a front end builds a [`NeuronLayout`] once
//! per individual and asks for [`active_synapses`] each frame from the last
//! trace.

use crate::error::{Error, Result};
use crate::neural::{NeuralNet, Trace};

/// Screen coordinates of every neuron, bias units excluded
#[derive(Debug, Clone, PartialEq)]
pub struct NeuronLayout {
    layers: Vec<Vec<(f64, f64)>>,
}

impl NeuronLayout {
    /// Layers are spread over `width` in equal columns and each column is
    /// centred vertically on the widest one.
    pub fn new(net: &NeuralNet, width: f64, height: f64) -> Self {
        let sizes = net.layer_sizes();
        let breadth = sizes.iter().copied().max().unwrap_or(0);
        let x_step = width / sizes.len() as f64;
        let y_step = height / (breadth + 1) as f64;

        let layers = sizes
            .iter()
            .enumerate()
            .map(|(column, &size)| {
                let x = x_step / 2.0 + column as f64 * x_step;
                let top = y_step * (breadth - size) as f64 / 2.0;
                (1..=size).map(|n| (x, top + n as f64 * y_step)).collect()
            })
            .collect();

        Self { layers }
    }

    pub fn layers(&self) -> &[Vec<(f64, f64)>] {
        &self.layers
    }

    pub fn position(&self, layer: usize, neuron: usize) -> Option<(f64, f64)> {
        self.layers.get(layer)?.get(neuron).copied()
    }
}

/// An edge currently carrying signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSynapse {
    /// Index of the source layer
    pub layer: usize,
    pub from: usize,
    pub to: usize,
    pub weight: f64,
    /// Source activation times weight
    pub signal: f64,
}

/// Edges whose weight times source activation is non-zero.
///
/// `trace` must come from [`NeuralNet::feed_traced`] on the same network.
/// Bias units are skipped.
pub fn active_synapses(net: &NeuralNet, trace: &Trace) -> Result<Vec<ActiveSynapse>> {
    let weights = net.weights();
    if trace.len() != weights.len() + 1 {
        return Err(Error::ShapeMismatch {
            expected: weights.len() + 1,
            found: trace.len(),
        });
    }

    let sizes = net.layer_sizes();
    let mut active = Vec::new();
    for (layer, w) in weights.iter().enumerate() {
        let source = &trace[layer];
        if source.len() < sizes[layer] {
            return Err(Error::ShapeMismatch {
                expected: sizes[layer],
                found: source.len(),
            });
        }
        for from in 0..sizes[layer] {
            for to in 0..sizes[layer + 1] {
                let weight = w[[from, to]];
                let signal = weight * source[from];
                if signal != 0.0 {
                    active.push(ActiveSynapse {
                        layer,
                        from,
                        to,
                        weight,
                        signal,
                    });
                }
            }
        }
    }
    Ok(active)
}

/// RGB for a neuron value: green when positive, red when negative
pub fn neuron_color(value: f64) -> [u8; 3] {
    let green = (value.max(0.0).min(1.0) * 255.0).round() as u8;
    let red = (value.min(0.0).max(-1.0).abs() * 255.0).round() as u8;
    [red, green, 0]
}
