//! One episode per individual against an [`Environment`].

use crate::environment::{Environment, TaskParams};
use crate::error::{Error, Result};
use crate::individual::Individual;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How the distance to the target becomes a score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMode {
    /// Distance at the end of the trial
    #[default]
    Final,
    /// Closest distance reached at any tick, starting from the initial distance
    RunningMin,
}

/// Trial parameters that do not change between individuals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialSettings {
    pub max_steps: u32,
    /// Trial ends once the body drops below this height
    pub min_height: f64,
    pub score_mode: ScoreMode,
    /// Added to the score for every tick a posture sensor touches the ground
    pub posture_penalty: f64,
    /// Force the mirrored view regardless of target side
    pub mirror: bool,
}

impl Default for TrialSettings {
    fn default() -> Self {
        Self {
            max_steps: 500,
            min_height: 0.0,
            score_mode: ScoreMode::Final,
            posture_penalty: 0.0,
            mirror: false,
        }
    }
}

/// Why a trial stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    StepBudget,
    Asleep,
    Fell,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    /// Lower is better
    pub score: f64,
    pub steps: u32,
    pub termination: Termination,
    /// Posture penalty included in `score`
    pub penalty: f64,
}

/// Stateless episode driver
#[derive(Debug, Clone, Default)]
pub struct TrialRunner {
    settings: TrialSettings,
}

impl TrialRunner {
    pub fn new(settings: TrialSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TrialSettings {
        &self.settings
    }

    /// Run one trial and score it.
    ///
    /// Any error is reported as [`Error::Trial`] carrying the individual's id.
    /// The environment is torn down on every path.
    pub fn run<E: Environment + ?Sized>(
        &self,
        individual: &mut Individual,
        env: &mut E,
        task: &TaskParams,
    ) -> Result<TrialOutcome> {
        individual.set_target(task.target);
        let result = self.episode(individual, env, task);
        env.destroy();

        result.map_err(|source| Error::Trial {
            individual: individual.id(),
            source: Box::new(source),
        })
    }

    fn episode<E: Environment + ?Sized>(
        &self,
        individual: &mut Individual,
        env: &mut E,
        task: &TaskParams,
    ) -> Result<TrialOutcome> {
        let morphology = Arc::clone(individual.morphology());
        let mut obs = env.reset(&morphology, task)?;

        let mut closest = env.current_position().distance(task.target);
        let mut penalty = 0.0;
        let mut steps = 0u32;

        let termination = loop {
            let commands = individual.update(&obs, env.current_position(), self.settings.mirror)?;
            obs = env.step(commands)?;
            steps += 1;

            let position = env.current_position();
            closest = closest.min(position.distance(task.target));

            if self.settings.posture_penalty != 0.0
                && morphology
                    .posture_sensors
                    .iter()
                    .any(|&i| obs.contacts.get(i).copied().unwrap_or(false))
            {
                penalty += self.settings.posture_penalty;
            }

            if position.y < self.settings.min_height {
                break Termination::Fell;
            }
            if !obs.alive {
                break Termination::Asleep;
            }
            if steps >= self.settings.max_steps {
                break Termination::StepBudget;
            }
        };

        let distance = match self.settings.score_mode {
            ScoreMode::Final => env.current_position().distance(task.target),
            ScoreMode::RunningMin => closest,
        };

        log::trace!(
            "individual {} finished after {} steps ({:?}), distance {:.3}",
            individual.id(),
            steps,
            termination,
            distance
        );

        Ok(TrialOutcome {
            score: distance + penalty,
            steps,
            termination,
            penalty,
        })
    }
}

/// Scores individuals for the population.
///
/// Each rayon worker split owns one `Worker` (typically an environment); the
/// evaluator itself is shared read-only.
pub trait Evaluator: Sync {
    type Worker;

    fn worker(&self) -> Self::Worker;

    /// Score one individual; lower is better
    fn evaluate(
        &self,
        worker: &mut Self::Worker,
        individual: &mut Individual,
        task: &TaskParams,
    ) -> Result<f64>;
}

/// Runs a [`TrialRunner`] episode in a fresh environment per worker
pub struct TrialEvaluator<F> {
    runner: TrialRunner,
    make_env: F,
}

impl<F> TrialEvaluator<F> {
    pub fn new(runner: TrialRunner, make_env: F) -> Self {
        Self { runner, make_env }
    }

    pub fn runner(&self) -> &TrialRunner {
        &self.runner
    }
}

impl<E, F> Evaluator for TrialEvaluator<F>
where
    E: Environment,
    F: Fn() -> E + Sync,
{
    type Worker = E;

    fn worker(&self) -> E {
        (self.make_env)()
    }

    fn evaluate(&self, env: &mut E, individual: &mut Individual, task: &TaskParams) -> Result<f64> {
        Ok(self.runner.run(individual, env, task)?.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Observation, SandboxEnv, Vec2};
    use crate::individual::IndividualId;
    use crate::morphology::Morphology;
    use crate::neural::Activation;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Moves along a fixed script regardless of commands
    struct ScriptedEnv {
        path: Vec<Vec2>,
        tick: usize,
        asleep_at: Option<usize>,
        posture_contact: bool,
        joints: usize,
        sensors: usize,
        destroyed: bool,
    }

    impl ScriptedEnv {
        fn new(path: Vec<Vec2>) -> Self {
            Self {
                path,
                tick: 0,
                asleep_at: None,
                posture_contact: false,
                joints: 4,
                sensors: 4,
                destroyed: false,
            }
        }

        fn observation(&self) -> Observation {
            let mut contacts = vec![false; self.sensors];
            if self.posture_contact {
                contacts[1] = true;
            }
            Observation {
                joint_angles: vec![0.0; self.joints],
                contacts,
                body_angle: 0.0,
                alive: self.asleep_at.map_or(true, |t| self.tick < t),
            }
        }
    }

    impl Environment for ScriptedEnv {
        fn reset(&mut self, _morphology: &Morphology, _task: &TaskParams) -> Result<Observation> {
            self.tick = 0;
            self.destroyed = false;
            Ok(self.observation())
        }

        fn step(&mut self, _commands: &[f64]) -> Result<Observation> {
            self.tick += 1;
            Ok(self.observation())
        }

        fn current_position(&self) -> Vec2 {
            self.path[self.tick.min(self.path.len() - 1)]
        }

        fn destroy(&mut self) {
            self.destroyed = true;
        }
    }

    fn cubotron() -> Individual {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        Individual::random(
            IndividualId(3),
            Arc::new(Morphology::cubotron1000()),
            &[6],
            Activation::Tanh,
            "Test",
            &mut rng,
        )
        .unwrap()
    }

    fn task() -> TaskParams {
        TaskParams {
            start: Vec2::new(0.0, 1.0),
            target: Vec2::new(10.0, 1.0),
            terrain_seed: 0,
            roughness: 0.0,
        }
    }

    fn walk_there_and_back() -> Vec<Vec2> {
        (0..=20)
            .map(|t| {
                let x = if t <= 10 { t as f64 } else { 20.0 - t as f64 };
                Vec2::new(x * 0.5, 1.0)
            })
            .collect()
    }

    #[test]
    fn test_final_distance_score() {
        let runner = TrialRunner::new(TrialSettings {
            max_steps: 10,
            ..TrialSettings::default()
        });
        let mut env = ScriptedEnv::new(walk_there_and_back());
        let mut ind = cubotron();

        let outcome = runner.run(&mut ind, &mut env, &task()).unwrap();

        assert_eq!(outcome.steps, 10);
        assert_eq!(outcome.termination, Termination::StepBudget);
        assert!((outcome.score - 5.0).abs() < 1e-12);
        assert!(env.destroyed);
        assert_eq!(ind.target(), Vec2::new(10.0, 1.0));
    }

    #[test]
    fn test_running_min_keeps_closest() {
        let runner = TrialRunner::new(TrialSettings {
            max_steps: 20,
            score_mode: ScoreMode::RunningMin,
            ..TrialSettings::default()
        });
        let mut env = ScriptedEnv::new(walk_there_and_back());
        let mut ind = cubotron();

        let outcome = runner.run(&mut ind, &mut env, &task()).unwrap();

        assert!((outcome.score - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_running_min_starts_at_initial_distance() {
        let runner = TrialRunner::new(TrialSettings {
            max_steps: 5,
            score_mode: ScoreMode::RunningMin,
            ..TrialSettings::default()
        });
        let away: Vec<Vec2> = (0..10).map(|t| Vec2::new(-(t as f64), 1.0)).collect();
        let mut env = ScriptedEnv::new(away);

        let outcome = runner.run(&mut cubotron(), &mut env, &task()).unwrap();
        assert!((outcome.score - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_asleep_ends_trial() {
        let runner = TrialRunner::default();
        let mut env = ScriptedEnv::new(vec![Vec2::new(0.0, 1.0)]);
        env.asleep_at = Some(7);

        let outcome = runner.run(&mut cubotron(), &mut env, &task()).unwrap();
        assert_eq!(outcome.steps, 7);
        assert_eq!(outcome.termination, Termination::Asleep);
    }

    #[test]
    fn test_falling_ends_trial() {
        let runner = TrialRunner::default();
        let path = vec![Vec2::new(0.0, 1.0), Vec2::new(0.0, 0.5), Vec2::new(0.0, -0.1)];
        let mut env = ScriptedEnv::new(path);

        let outcome = runner.run(&mut cubotron(), &mut env, &task()).unwrap();
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.termination, Termination::Fell);
    }

    #[test]
    fn test_posture_penalty_accumulates() {
        let runner = TrialRunner::new(TrialSettings {
            max_steps: 8,
            posture_penalty: 0.25,
            ..TrialSettings::default()
        });
        let mut env = ScriptedEnv::new(vec![Vec2::new(10.0, 1.0)]);
        env.posture_contact = true;

        let outcome = runner.run(&mut cubotron(), &mut env, &task()).unwrap();
        assert!((outcome.penalty - 2.0).abs() < 1e-12);
        assert!((outcome.score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch_names_individual() {
        let runner = TrialRunner::default();
        let mut env = ScriptedEnv::new(vec![Vec2::new(0.0, 1.0)]);
        env.joints = 3;

        let err = runner.run(&mut cubotron(), &mut env, &task()).unwrap_err();
        match err {
            Error::Trial { individual, source } => {
                assert_eq!(individual, IndividualId(3));
                assert!(matches!(*source, Error::ShapeMismatch { expected: 4, found: 3 }));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(env.destroyed);
    }

    #[test]
    fn test_sandbox_trial_is_repeatable() {
        let runner = TrialRunner::new(TrialSettings {
            max_steps: 200,
            ..TrialSettings::default()
        });
        let task = TaskParams {
            roughness: 20.0,
            terrain_seed: 9,
            ..task()
        };
        let mut env = SandboxEnv::new();
        let mut ind = cubotron();

        let a = runner.run(&mut ind, &mut env, &task).unwrap();
        let b = runner.run(&mut ind, &mut env, &task).unwrap();

        assert_eq!(a, b);
        assert!(a.score.is_finite());
        assert!(env.contact_map().is_empty());
    }

    #[test]
    fn test_trial_evaluator_uses_runner() {
        let settings = TrialSettings {
            max_steps: 10,
            ..TrialSettings::default()
        };
        let evaluator = TrialEvaluator::new(TrialRunner::new(settings), || {
            ScriptedEnv::new(walk_there_and_back())
        });
        let mut env = evaluator.worker();
        let score = evaluator.evaluate(&mut env, &mut cubotron(), &task()).unwrap();
        assert!((score - 5.0).abs() < 1e-12);
        assert_eq!(evaluator.runner().settings().max_steps, 10);
    }
}
