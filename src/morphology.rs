//! Declarative creature layouts.
//!
//! A [`Morphology`] fixes the sensor/actuator wiring of one creature type:
//! joint order, contact sensors, per-joint actuator gain and the optional
//! body-angle sensor. Joints and contact sensors are listed left to right so
//! that reversing either list yields the mirrored creature.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One actuated joint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDef {
    pub name: String,
    /// Multiplier from network output to motor speed (sign included)
    pub gain: f64,
    /// Torque limit handed to the environment
    pub max_torque: f64,
}

impl JointDef {
    pub fn new(name: &str, gain: f64, max_torque: f64) -> Self {
        Self {
            name: name.to_string(),
            gain,
            max_torque,
        }
    }
}

/// Creature layout shared read-only by every individual of one type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Morphology {
    pub tag: String,
    pub joints: Vec<JointDef>,
    pub contact_sensors: Vec<String>,
    #[serde(default)]
    pub body_angle_sensor: bool,
    /// Contact sensors whose activation counts as bad posture
    #[serde(default)]
    pub posture_sensors: Vec<usize>,
}

impl Morphology {
    /// Four joints, four ground sensors
    pub fn cubotron1000() -> Self {
        Self {
            tag: "Cubotron1000".to_string(),
            joints: vec![
                JointDef::new("lfoot", 20.0, 10.0),
                JointDef::new("lleg", 20.0, 20.0),
                JointDef::new("rleg", 20.0, 20.0),
                JointDef::new("rfoot", 20.0, 10.0),
            ],
            contact_sensors: ["lfoot", "lbody", "rbody", "rfoot"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            body_angle_sensor: false,
            posture_sensors: vec![1, 2],
        }
    }

    /// Six joints, six ground sensors and a body-angle sensor
    pub fn boulotron2000() -> Self {
        Self {
            tag: "Boulotron2000".to_string(),
            joints: vec![
                JointDef::new("lankle", -5.0, 10.0),
                JointDef::new("lknee", -15.0, 10.0),
                JointDef::new("lhip", -15.0, 20.0),
                JointDef::new("rhip", -15.0, 20.0),
                JointDef::new("rknee", -15.0, 10.0),
                JointDef::new("rankle", -5.0, 10.0),
            ],
            contact_sensors: ["lfoot", "lheel", "lbody", "rbody", "rheel", "rfoot"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            body_angle_sensor: true,
            posture_sensors: vec![2, 3],
        }
    }

    /// Number of actuated joints (J)
    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Number of contact sensors (S)
    #[inline]
    pub fn sensor_count(&self) -> usize {
        self.contact_sensors.len()
    }

    /// `2 + J + S [+ 1]`
    pub fn input_width(&self) -> usize {
        2 + self.joint_count() + self.sensor_count() + usize::from(self.body_angle_sensor)
    }

    /// One command per joint
    pub fn output_width(&self) -> usize {
        self.joint_count()
    }

    /// Index of the joint that mirrors joint `i`
    #[inline]
    pub fn mirror_joint(&self, i: usize) -> usize {
        self.joint_count() - 1 - i
    }

    /// Index of the contact sensor that mirrors sensor `i`
    #[inline]
    pub fn mirror_sensor(&self, i: usize) -> usize {
        self.sensor_count() - 1 - i
    }

    #[inline]
    pub fn gains(&self) -> impl Iterator<Item = f64> + '_ {
        self.joints.iter().map(|j| j.gain)
    }

    /// Full layer list for a controller with the given hidden layers
    pub fn layer_sizes(&self, hidden: &[usize]) -> Vec<usize> {
        let mut layers = Vec::with_capacity(hidden.len() + 2);
        layers.push(self.input_width());
        layers.extend_from_slice(hidden);
        layers.push(self.output_width());
        layers
    }

    /// Check that reversing the joint and sensor lists describes the mirrored body
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(Error::InvalidMorphology(format!("{}: {}", self.tag, reason)));

        if self.tag.trim().is_empty() {
            return Err(Error::InvalidMorphology("empty tag".to_string()));
        }
        if self.joints.is_empty() {
            return fail("at least one joint is required".to_string());
        }
        if self.joint_count() % 2 != 0 {
            return fail(format!(
                "joint count must be even for mirroring, got {}",
                self.joint_count()
            ));
        }
        for i in 0..self.joint_count() / 2 {
            let (a, b) = (&self.joints[i], &self.joints[self.mirror_joint(i)]);
            if a.gain != b.gain {
                return fail(format!(
                    "mirrored joints {} and {} have different gains ({} vs {})",
                    a.name, b.name, a.gain, b.gain
                ));
            }
            if a.max_torque != b.max_torque {
                return fail(format!(
                    "mirrored joints {} and {} have different torque limits",
                    a.name, b.name
                ));
            }
        }
        if self.joints.iter().any(|j| !j.gain.is_finite() || !j.max_torque.is_finite()) {
            return fail("joint gains and torques must be finite".to_string());
        }
        if let Some(&bad) = self.posture_sensors.iter().find(|&&i| i >= self.sensor_count()) {
            return fail(format!(
                "posture sensor {} out of range ({} contact sensors)",
                bad,
                self.sensor_count()
            ));
        }
        Ok(())
    }
}

/// Known morphologies, looked up by tag
#[derive(Debug, Clone)]
pub struct MorphologyRegistry {
    entries: BTreeMap<String, Arc<Morphology>>,
}

impl Default for MorphologyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl MorphologyRegistry {
    /// Empty registry
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in creatures
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        let cubotron = Arc::new(Morphology::cubotron1000());
        registry
            .entries
            .insert("Animatronic".to_string(), Arc::clone(&cubotron));
        registry.entries.insert(cubotron.tag.clone(), cubotron);
        let boulotron = Arc::new(Morphology::boulotron2000());
        registry.entries.insert(boulotron.tag.clone(), boulotron);
        registry
    }

    /// Validate and add a descriptor, replacing any previous one with the same tag
    pub fn register(&mut self, morphology: Morphology) -> Result<Arc<Morphology>> {
        morphology.validate()?;
        let entry = Arc::new(morphology);
        self.entries.insert(entry.tag.clone(), Arc::clone(&entry));
        Ok(entry)
    }

    pub fn get(&self, tag: &str) -> Result<Arc<Morphology>> {
        self.entries
            .get(tag.trim())
            .cloned()
            .ok_or_else(|| Error::UnknownMorphology(tag.trim().to_string()))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }
}
