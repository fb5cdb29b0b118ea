//! Environment contract consumed by the trial runner.
//!
//! The physics engine is an external collaborator: anything implementing
//! [`Environment`] can host trials. [`SandboxEnv`] is a small deterministic
//! planar walker used by the CLI, the benches and the tests. It is not meant
//! to be physically accurate.

use crate::error::{Error, Result};
use crate::morphology::Morphology;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{Add, Mul, Sub};

/// Fixed simulation timestep (60 Hz)
pub const TIME_STEP: f64 = 1.0 / 60.0;

/// 2D vector in world units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Unit vector in the same direction (zero stays zero)
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self::new(self.x / len, self.y / len)
        } else {
            self
        }
    }

    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        (other - self).length()
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Per-trial task description handed to [`Environment::reset`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
    pub start: Vec2,
    pub target: Vec2,
    /// Seed for terrain generation
    pub terrain_seed: u64,
    /// Elevation variation in percent per metre
    pub roughness: f64,
}

impl Default for TaskParams {
    fn default() -> Self {
        Self {
            start: Vec2::new(-3.0, 3.0),
            target: Vec2::new(35.0, 2.0),
            terrain_seed: 0,
            roughness: 0.0,
        }
    }
}

/// Sensor readings after a physics step
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Observation {
    /// Raw joint angles in radians, in morphology joint order
    pub joint_angles: Vec<f64>,
    /// Ground contact flags, in morphology sensor order
    pub contacts: Vec<bool>,
    /// Body orientation in radians
    pub body_angle: f64,
    /// False once the body has come to rest
    pub alive: bool,
}

/// Simulation context for one body at a time
pub trait Environment {
    /// Build the body described by `morphology` at `task.start`
    fn reset(&mut self, morphology: &Morphology, task: &TaskParams) -> Result<Observation>;

    /// Apply motor commands and advance one [`TIME_STEP`]
    fn step(&mut self, commands: &[f64]) -> Result<Observation>;

    /// Current body position
    fn current_position(&self) -> Vec2;

    /// Tear the body down
    fn destroy(&mut self);
}

/// Body identifier inside one environment instance
pub type BodyId = u64;

/// Contact flags per body, owned by a single environment instance
#[derive(Debug, Clone, Default)]
pub struct ContactMap {
    sensors: HashMap<BodyId, Vec<bool>>,
}

impl ContactMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, body: BodyId, count: usize) {
        self.sensors.insert(body, vec![false; count]);
    }

    pub fn unregister(&mut self, body: BodyId) {
        self.sensors.remove(&body);
    }

    /// Set one flag; unknown bodies and indices are ignored
    pub fn set(&mut self, body: BodyId, sensor: usize, touching: bool) {
        if let Some(flag) = self.sensors.get_mut(&body).and_then(|s| s.get_mut(sensor)) {
            *flag = touching;
        }
    }

    pub fn get(&self, body: BodyId) -> Option<&[bool]> {
        self.sensors.get(&body).map(|s| s.as_slice())
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

/// Ground profile: seeded random walk sampled every metre
#[derive(Debug, Clone)]
pub struct Terrain {
    start_x: i32,
    heights: Vec<f64>,
}

impl Terrain {
    const MIN_X: i32 = -50;
    const MAX_X: i32 = 100;

    pub fn flat() -> Self {
        Self {
            start_x: Self::MIN_X,
            heights: vec![0.0; (Self::MAX_X - Self::MIN_X + 1) as usize],
        }
    }

    pub fn generate(seed: u64, roughness: f64) -> Self {
        if roughness <= 0.0 {
            return Self::flat();
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut elevation = 0.0;
        let heights = (Self::MIN_X..=Self::MAX_X)
            .map(|_| {
                let h = elevation;
                elevation += (rng.gen::<f64>() - 0.5) * roughness * 0.01;
                h
            })
            .collect();
        Self {
            start_x: Self::MIN_X,
            heights,
        }
    }

    /// Linearly interpolated ground height
    pub fn height_at(&self, x: f64) -> f64 {
        let last = self.heights.len() - 1;
        let pos = (x - self.start_x as f64).clamp(0.0, last as f64);
        let i = (pos.floor() as usize).min(last);
        let j = (i + 1).min(last);
        let t = pos - i as f64;
        self.heights[i] * (1.0 - t) + self.heights[j] * t
    }
}

/// Deterministic toy walker.
///
/// Joints follow their commanded speed within `±JOINT_LIMIT`; a limb pressed
/// into the ground pushes the body horizontally. The model is exactly
/// mirror-symmetric: reflecting a pose and its commands reflects the motion.
#[derive(Debug, Clone)]
pub struct SandboxEnv {
    contacts: ContactMap,
    next_body: BodyId,
    body: Option<BodyId>,
    terrain: Terrain,
    position: Vec2,
    body_angle: f64,
    angles: Vec<f64>,
    max_speed: Vec<f64>,
    posture: Vec<usize>,
    sensor_count: usize,
    still_ticks: u32,
}

impl Default for SandboxEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxEnv {
    /// Joint angle limit in radians
    pub const JOINT_LIMIT: f64 = 1.2;
    /// Ticks of near-zero motion before the body falls asleep
    pub const SLEEP_TICKS: u32 = 60;
    const SLEEP_EPSILON: f64 = 1e-4;
    const LEVER: f64 = 0.35;
    const TILT_GAIN: f64 = 0.05;
    const STANCE: f64 = 0.6;

    pub fn new() -> Self {
        Self {
            contacts: ContactMap::new(),
            next_body: 0,
            body: None,
            terrain: Terrain::flat(),
            position: Vec2::default(),
            body_angle: 0.0,
            angles: Vec::new(),
            max_speed: Vec::new(),
            posture: Vec::new(),
            sensor_count: 0,
            still_ticks: 0,
        }
    }

    /// Contact flags of every body currently alive in this environment
    pub fn contact_map(&self) -> &ContactMap {
        &self.contacts
    }

    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    #[inline]
    fn joint_count(&self) -> usize {
        self.angles.len()
    }

    /// Left-half limbs touch the ground with negative angles, right-half with positive
    fn limb_down(&self, joint: usize) -> bool {
        let left = joint < self.joint_count() / 2;
        let a = self.angles[joint];
        if left {
            a <= 0.0
        } else {
            a >= 0.0
        }
    }

    fn refresh_contacts(&mut self) {
        let Some(body) = self.body else { return };
        let j = self.joint_count();
        let s = self.sensor_count;
        for sensor in 0..s {
            let left = sensor < s / 2;
            let touching = if self.posture.contains(&sensor) {
                if left {
                    self.body_angle > 0.8
                } else {
                    self.body_angle < -0.8
                }
            } else {
                // Pair sensor with the joint at the same relative position
                let joint = if s <= 1 {
                    0
                } else if left {
                    (sensor * j) / s
                } else {
                    j - 1 - ((s - 1 - sensor) * j) / s
                };
                self.limb_down(joint)
            };
            self.contacts.set(body, sensor, touching);
        }
    }

    fn observe(&self) -> Observation {
        let contacts = self
            .body
            .and_then(|b| self.contacts.get(b))
            .map(|c| c.to_vec())
            .unwrap_or_default();
        Observation {
            joint_angles: self.angles.clone(),
            contacts,
            body_angle: self.body_angle,
            alive: self.still_ticks < Self::SLEEP_TICKS,
        }
    }
}

impl Environment for SandboxEnv {
    fn reset(&mut self, morphology: &Morphology, task: &TaskParams) -> Result<Observation> {
        self.destroy();

        let body = self.next_body;
        self.next_body += 1;
        self.body = Some(body);
        self.contacts.register(body, morphology.sensor_count());

        self.terrain = Terrain::generate(task.terrain_seed, task.roughness);
        self.position = task.start;
        self.body_angle = 0.0;
        self.angles = vec![0.0; morphology.joint_count()];
        self.max_speed = morphology.joints.iter().map(|j| j.max_torque).collect();
        self.posture = morphology.posture_sensors.clone();
        self.sensor_count = morphology.sensor_count();
        self.still_ticks = 0;
        self.refresh_contacts();

        Ok(self.observe())
    }

    fn step(&mut self, commands: &[f64]) -> Result<Observation> {
        if commands.len() != self.joint_count() {
            return Err(Error::ShapeMismatch {
                expected: self.joint_count(),
                found: commands.len(),
            });
        }

        let mut push = 0.0;
        let mut twist = 0.0;
        let mut motion = 0.0;
        for (j, &cmd) in commands.iter().enumerate() {
            let limit = self.max_speed[j];
            let speed = if cmd.is_finite() { cmd.clamp(-limit, limit) } else { 0.0 };
            let before = self.angles[j];
            let after = (before + speed * TIME_STEP).clamp(-Self::JOINT_LIMIT, Self::JOINT_LIMIT);
            let omega = (after - before) / TIME_STEP;
            self.angles[j] = after;

            if self.limb_down(j) {
                push -= omega * Self::LEVER;
            }
            twist += omega * Self::TILT_GAIN;
            motion += omega.abs();
        }

        let grounded = (0..self.joint_count()).filter(|&j| self.limb_down(j)).count();
        let support = grounded as f64 / self.joint_count().max(1) as f64;

        self.body_angle = (self.body_angle + twist * TIME_STEP) * (1.0 - 0.02 * support);
        let dx = push * TIME_STEP;
        let stance = if self.body_angle.abs() > std::f64::consts::FRAC_PI_2 {
            0.2
        } else {
            Self::STANCE + 0.2 * support
        };
        let ground = self.terrain.height_at(self.position.x + dx);
        let dy = (ground + stance - self.position.y) * 0.2;
        self.position = self.position + Vec2::new(dx, dy);

        if motion * TIME_STEP + dx.abs() + dy.abs() < Self::SLEEP_EPSILON {
            self.still_ticks += 1;
        } else {
            self.still_ticks = 0;
        }

        self.refresh_contacts();
        Ok(self.observe())
    }

    fn current_position(&self) -> Vec2 {
        self.position
    }

    fn destroy(&mut self) {
        if let Some(body) = self.body.take() {
            self.contacts.unregister(body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec2_ops() {
        let a = Vec2::new(3.0, 4.0);
        assert_eq!(a.length(), 5.0);
        let n = a.normalized();
        assert!((n.length() - 1.0).abs() < 1e-12);
        assert_eq!(Vec2::default().normalized(), Vec2::default());
        assert_eq!(a - Vec2::new(1.0, 1.0), Vec2::new(2.0, 3.0));
        assert_eq!(a.distance(Vec2::new(0.0, 0.0)), 5.0);
    }

    #[test]
    fn test_contact_map_lifecycle() {
        let mut map = ContactMap::new();
        map.register(1, 3);
        map.set(1, 2, true);
        map.set(1, 9, true);
        map.set(2, 0, true);

        assert_eq!(map.get(1), Some(&[false, false, true][..]));
        assert_eq!(map.get(2), None);

        map.unregister(1);
        assert!(map.is_empty());
    }

    #[test]
    fn test_terrain_is_seeded() {
        let a = Terrain::generate(7, 20.0);
        let b = Terrain::generate(7, 20.0);
        let c = Terrain::generate(8, 20.0);

        assert_eq!(a.height_at(12.5), b.height_at(12.5));
        assert_ne!(a.height_at(30.0), c.height_at(30.0));
        assert_eq!(Terrain::generate(7, 0.0).height_at(30.0), 0.0);
        assert_eq!(a.height_at(-50.0), 0.0);
    }

    #[test]
    fn test_reset_registers_body() {
        let mut env = SandboxEnv::new();
        let morph = Morphology::boulotron2000();

        let obs = env.reset(&morph, &TaskParams::default()).unwrap();
        assert_eq!(obs.joint_angles.len(), 6);
        assert_eq!(obs.contacts.len(), 6);
        assert!(obs.alive);
        assert_eq!(env.contact_map().len(), 1);
        assert_eq!(env.current_position(), Vec2::new(-3.0, 3.0));

        // A second reset replaces the body instead of leaking it
        env.reset(&morph, &TaskParams::default()).unwrap();
        assert_eq!(env.contact_map().len(), 1);

        env.destroy();
        assert!(env.contact_map().is_empty());
    }

    #[test]
    fn test_step_rejects_wrong_width() {
        let mut env = SandboxEnv::new();
        env.reset(&Morphology::cubotron1000(), &TaskParams::default()).unwrap();
        assert!(matches!(
            env.step(&[0.0; 3]),
            Err(Error::ShapeMismatch {
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn test_idle_body_falls_asleep() {
        let mut env = SandboxEnv::new();
        env.reset(&Morphology::cubotron1000(), &TaskParams::default()).unwrap();

        let mut alive = true;
        for _ in 0..2000 {
            alive = env.step(&[0.0; 4]).unwrap().alive;
            if !alive {
                break;
            }
        }
        assert!(!alive);
    }

    #[test]
    fn test_motion_is_mirror_symmetric() {
        let morph = Morphology::cubotron1000();
        let task = TaskParams {
            start: Vec2::new(0.0, 1.0),
            ..TaskParams::default()
        };
        let mut env = SandboxEnv::new();
        let mut mirror = SandboxEnv::new();
        env.reset(&morph, &task).unwrap();
        mirror.reset(&morph, &task).unwrap();

        for t in 0..300 {
            let phase = t as f64 * 0.1;
            let cmds = [phase.sin() * 8.0, (phase * 1.3).cos() * 5.0, phase.cos() * 3.0, -phase.sin()];
            let mirrored: Vec<f64> = cmds.iter().rev().map(|c| -c).collect();
            env.step(&cmds).unwrap();
            mirror.step(&mirrored).unwrap();
        }

        let a = env.current_position();
        let b = mirror.current_position();
        assert!((a.x + b.x).abs() < 1e-9, "{} vs {}", a.x, b.x);
        assert!((a.y - b.y).abs() < 1e-9);
        assert!(a.x.abs() > 0.01, "walker should move");
    }
}
