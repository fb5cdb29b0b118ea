//! Neural controller module.
//!
//! Implements the fixed-topology feedforward genome with:
//! - Explicit per-layer weight matrices with bias rows
//! - Weight mutation with one-way synapse silencing
//! - Column-wise (whole-gene) and uniform crossover

mod crossover;
mod mutations;
mod network;

pub use crossover::CrossoverStrategy;
pub use mutations::MutationConfig;
pub use network::{total_neurons, total_synapses, Activation, NeuralNet, Trace};
