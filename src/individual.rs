//! Individuals and the symmetry-aware sensor to actuator mapping.

use crate::environment::{Observation, Vec2};
use crate::error::{Error, Result};
use crate::morphology::Morphology;
use crate::neural::{Activation, NeuralNet, Trace};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt;
use std::sync::Arc;

/// Unique individual identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndividualId(pub u64);

impl fmt::Display for IndividualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Map a joint angle onto `[-1, 1)`, with `[-π, π)` covering the full range and 0 at the center
#[inline]
pub fn normalize_joint_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) / PI - 1.0
}

/// Map a body angle onto `(-1, 1)`, keeping its sign
#[inline]
pub fn normalize_body_angle(angle: f64) -> f64 {
    if angle < 0.0 {
        -((-angle).rem_euclid(TAU) / TAU)
    } else {
        angle.rem_euclid(TAU) / TAU
    }
}

/// One controller bound to a creature layout
#[derive(Debug, Clone)]
pub struct Individual {
    id: IndividualId,
    morphology: Arc<Morphology>,
    brain: NeuralNet,
    score: Option<f64>,
    pop_id: String,
    target: Vec2,
    commands: Vec<f64>,
    trace_enabled: bool,
    last_trace: Option<Trace>,
}

impl Individual {
    /// Bind `brain` to `morphology`, checking that the widths agree
    pub fn new(
        id: IndividualId,
        morphology: Arc<Morphology>,
        brain: NeuralNet,
        pop_id: impl Into<String>,
    ) -> Result<Self> {
        if brain.input_width() != morphology.input_width() {
            return Err(Error::ShapeMismatch {
                expected: morphology.input_width(),
                found: brain.input_width(),
            });
        }
        if brain.output_width() != morphology.output_width() {
            return Err(Error::ShapeMismatch {
                expected: morphology.output_width(),
                found: brain.output_width(),
            });
        }

        let commands = vec![0.0; morphology.joint_count()];
        Ok(Self {
            id,
            morphology,
            brain,
            score: None,
            pop_id: pop_id.into(),
            target: Vec2::default(),
            commands,
            trace_enabled: false,
            last_trace: None,
        })
    }

    /// Fresh individual with random weights
    pub fn random<R: Rng + ?Sized>(
        id: IndividualId,
        morphology: Arc<Morphology>,
        hidden: &[usize],
        activation: Activation,
        pop_id: impl Into<String>,
        rng: &mut R,
    ) -> Result<Self> {
        let layers = morphology.layer_sizes(hidden);
        let brain = NeuralNet::random(&layers, activation, rng)?;
        Self::new(id, morphology, brain, pop_id)
    }

    /// Independent copy under a new identity, with the score cleared
    pub fn clone_as(&self, id: IndividualId) -> Self {
        Self {
            id,
            morphology: Arc::clone(&self.morphology),
            brain: self.brain.copy(),
            score: None,
            pop_id: self.pop_id.clone(),
            target: self.target,
            commands: vec![0.0; self.commands.len()],
            trace_enabled: self.trace_enabled,
            last_trace: None,
        }
    }

    /// Same as [`clone_as`](Self::clone_as) but with a different controller
    pub fn with_brain(&self, id: IndividualId, brain: NeuralNet) -> Result<Self> {
        let mut child = Self::new(id, Arc::clone(&self.morphology), brain, self.pop_id.clone())?;
        child.target = self.target;
        Ok(child)
    }

    #[inline]
    pub fn id(&self) -> IndividualId {
        self.id
    }

    pub fn morphology(&self) -> &Arc<Morphology> {
        &self.morphology
    }

    pub fn brain(&self) -> &NeuralNet {
        &self.brain
    }

    pub fn brain_mut(&mut self) -> &mut NeuralNet {
        &mut self.brain
    }

    #[inline]
    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn set_score(&mut self, score: f64) {
        self.score = Some(score);
    }

    pub fn clear_score(&mut self) {
        self.score = None;
    }

    pub fn pop_id(&self) -> &str {
        &self.pop_id
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    /// Commands computed by the last [`update`](Self::update), in joint order
    pub fn actuator_commands(&self) -> &[f64] {
        &self.commands
    }

    /// Keep every layer's activations from the next updates on
    pub fn set_trace(&mut self, enabled: bool) {
        self.trace_enabled = enabled;
        if !enabled {
            self.last_trace = None;
        }
    }

    pub fn last_trace(&self) -> Option<&Trace> {
        self.last_trace.as_ref()
    }

    /// Build the network input for the current observation.
    ///
    /// Returns the input vector and whether the view was mirrored.
    pub fn sensor_vector(
        &self,
        obs: &Observation,
        position: Vec2,
        mirror_override: bool,
    ) -> Result<(Vec<f64>, bool)> {
        let m = &self.morphology;
        let joints = m.joint_count();
        if obs.joint_angles.len() != joints {
            return Err(Error::ShapeMismatch {
                expected: joints,
                found: obs.joint_angles.len(),
            });
        }
        if obs.contacts.len() != m.sensor_count() {
            return Err(Error::ShapeMismatch {
                expected: m.sensor_count(),
                found: obs.contacts.len(),
            });
        }

        let mut delta = self.target - position;
        if delta.length() > 1.0 {
            delta = delta.normalized();
        }

        let mut angles: Vec<f64> = obs.joint_angles.iter().map(|&a| normalize_joint_angle(a)).collect();
        // Right half is stored negated so that a symmetric pose is its own mirror
        let half = joints / 2 + joints % 2;
        for a in &mut angles[half..] {
            *a = -*a;
        }
        let mut contacts: Vec<f64> = obs
            .contacts
            .iter()
            .map(|&c| if c { 1.0 } else { 0.0 })
            .collect();
        let mut body_angle = normalize_body_angle(obs.body_angle);

        let mirrored = delta.x < 0.0 || mirror_override;
        if mirrored {
            angles.reverse();
            contacts.reverse();
            delta.x = -delta.x;
            body_angle = -body_angle;
        }

        let mut input = Vec::with_capacity(m.input_width());
        input.push(delta.x);
        input.push(delta.y);
        input.extend_from_slice(&angles);
        input.extend_from_slice(&contacts);
        if m.body_angle_sensor {
            input.push(body_angle);
        }
        debug_assert_eq!(input.len(), m.input_width());

        Ok((input, mirrored))
    }

    /// Feed the current observation through the controller and refresh the
    /// actuator commands.
    ///
    /// When the target lies behind (negative x) or `mirror_override` is set the
    /// whole view is mirrored: joint and contact lists reversed, target x and
    /// body angle negated, and the outputs reversed and negated on the way out.
    pub fn update(
        &mut self,
        obs: &Observation,
        position: Vec2,
        mirror_override: bool,
    ) -> Result<&[f64]> {
        let (input, mirrored) = self.sensor_vector(obs, position, mirror_override)?;

        let output = if self.trace_enabled {
            let (output, trace) = self.brain.feed_traced(&input)?;
            self.last_trace = Some(trace);
            output
        } else {
            self.brain.feed(&input)?
        };

        let joints = self.morphology.joint_count();
        for (i, (cmd, gain)) in self
            .commands
            .iter_mut()
            .zip(self.morphology.gains())
            .enumerate()
        {
            let raw = if mirrored {
                -output[joints - 1 - i]
            } else {
                output[i]
            };
            *cmd = gain * raw;
        }

        Ok(self.commands.as_slice())
    }
}

const ADJECTIVES: &[&str] = &[
    "Agile", "Bold", "Brave", "Clumsy", "Curious", "Daring", "Eager", "Fierce", "Gentle",
    "Grumpy", "Happy", "Hasty", "Jolly", "Lazy", "Lucky", "Mighty", "Nimble", "Noisy", "Proud",
    "Quiet", "Restless", "Shy", "Sleepy", "Sneaky", "Steady", "Swift", "Tiny", "Wobbly",
];

const ANIMALS: &[&str] = &[
    "Badger", "Beetle", "Crab", "Crane", "Dingo", "Ferret", "Gecko", "Heron", "Ibex", "Jackal",
    "Koala", "Lemur", "Lynx", "Marmot", "Newt", "Ocelot", "Otter", "Panda", "Quokka", "Raven",
    "Salamander", "Tapir", "Toad", "Walrus", "Wombat", "Yak", "Zebra",
];

/// Two-word lineage label such as `Brave-Otter`
pub fn lineage_label<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Nameless");
    let animal = ANIMALS.choose(rng).copied().unwrap_or("Creature");
    format!("{}-{}", adjective, animal)
}
