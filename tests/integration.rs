//! Integration tests for NEURANIM

use neuranim::checkpoint::{self, CheckpointManager};
use neuranim::environment::Observation;
use neuranim::evolution::SurvivorCount;
use neuranim::morphology::JointDef;
use neuranim::population::TaskPlan;
use neuranim::{
    Activation, Environment, Error, Evaluator, Individual, IndividualId, Morphology,
    MorphologyRegistry, Population, PopulationSettings, PopulationState, Result, SandboxEnv,
    TaskParams, TrialEvaluator, TrialRunner, TrialSettings, Vec2,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

fn biped(contacts: &[&str]) -> Morphology {
    Morphology {
        tag: "Biped".to_string(),
        joints: vec![
            JointDef::new("left", 10.0, 5.0),
            JointDef::new("right", 10.0, 5.0),
        ],
        contact_sensors: contacts.iter().map(|s| s.to_string()).collect(),
        body_angle_sensor: false,
        posture_sensors: Vec::new(),
    }
}

/// Slides along x by the mean command
struct Rail {
    joints: usize,
    sensors: usize,
    position: Vec2,
}

impl Rail {
    fn new() -> Self {
        Self {
            joints: 0,
            sensors: 0,
            position: Vec2::default(),
        }
    }

    fn observe(&self) -> Observation {
        Observation {
            joint_angles: vec![0.0; self.joints],
            contacts: vec![false; self.sensors],
            body_angle: 0.0,
            alive: true,
        }
    }
}

impl Environment for Rail {
    fn reset(&mut self, morphology: &Morphology, task: &TaskParams) -> Result<Observation> {
        self.joints = morphology.joint_count();
        self.sensors = morphology.sensor_count();
        self.position = task.start;
        Ok(self.observe())
    }

    fn step(&mut self, commands: &[f64]) -> Result<Observation> {
        if commands.len() != self.joints {
            return Err(Error::ShapeMismatch {
                expected: self.joints,
                found: commands.len(),
            });
        }
        let mean = commands.iter().sum::<f64>() / commands.len() as f64;
        self.position.x += mean * 0.01;
        Ok(self.observe())
    }

    fn current_position(&self) -> Vec2 {
        self.position
    }

    fn destroy(&mut self) {}
}

/// Fixed score per individual id, cycling through `scores`
struct Table(Vec<f64>);

impl Evaluator for Table {
    type Worker = ();

    fn worker(&self) -> Self::Worker {}

    fn evaluate(&self, _: &mut (), individual: &mut Individual, _: &TaskParams) -> Result<f64> {
        Ok(self.0[individual.id().0 as usize % self.0.len()])
    }
}

fn rail_evaluator(max_steps: u32) -> TrialEvaluator<fn() -> Rail> {
    TrialEvaluator::new(
        TrialRunner::new(TrialSettings {
            max_steps,
            ..TrialSettings::default()
        }),
        Rail::new as fn() -> Rail,
    )
}

#[test]
fn test_end_to_end_generations() {
    let morphology = Arc::new(biped(&["lfoot", "rfoot"]));
    let mut population = Population::seed(
        morphology,
        &[4],
        Activation::Tanh,
        PopulationSettings {
            size: 10,
            survivors: SurvivorCount::Count(2),
            max_generations: 100,
        },
        2024,
    )
    .unwrap()
    .with_tasks(TaskPlan::fixed(TaskParams::default()));

    let evaluator = rail_evaluator(20);
    for _ in 0..5 {
        assert_eq!(
            population.advance_generation(&evaluator).unwrap(),
            PopulationState::Bred
        );
    }

    assert_eq!(population.generation(), 5);
    assert_eq!(population.len(), 10);
    assert_eq!(population.history().snapshots.len(), 5);
    for individual in population.individuals() {
        assert_eq!(individual.brain().layer_sizes(), &[6, 4, 2]);
        assert!(individual.brain().is_valid());
    }

    let best: Vec<f64> = population
        .history()
        .best_series()
        .into_iter()
        .map(|(_, b)| b)
        .collect();
    assert!(best.windows(2).all(|w| w[1] <= w[0]));
}

/// Fitness is the magnitude of the genome's first weight
struct FirstWeight;

impl Evaluator for FirstWeight {
    type Worker = ();

    fn worker(&self) -> Self::Worker {}

    fn evaluate(&self, _: &mut (), individual: &mut Individual, _: &TaskParams) -> Result<f64> {
        Ok(individual.brain().weights()[0][[0, 0]].abs())
    }
}

#[test]
fn test_first_weight_fitness_generations() {
    let mut population = Population::seed(
        Arc::new(biped(&["lfoot", "rfoot"])),
        &[4],
        Activation::Tanh,
        PopulationSettings {
            size: 10,
            survivors: SurvivorCount::Count(2),
            max_generations: 100,
        },
        7,
    )
    .unwrap();

    for _ in 0..5 {
        population.advance_generation(&FirstWeight).unwrap();
    }

    assert_eq!(population.generation(), 5);
    assert_eq!(population.len(), 10);
    assert_eq!(population.layers(), &[6, 4, 2]);

    // Survivors sit unmutated at the front of the bred pool
    let cutoff = population.history().latest().unwrap().survivor_cutoff.unwrap();
    for survivor in &population.individuals()[..2] {
        assert!(survivor.score().unwrap() <= cutoff);
    }
}

#[test]
fn test_saved_population_roundtrip() {
    let mut registry = MorphologyRegistry::empty();
    registry.register(biped(&[])).unwrap();

    let mut population = Population::seed(
        registry.get("Biped").unwrap(),
        &[3],
        Activation::Tanh,
        PopulationSettings {
            size: 3,
            survivors: SurvivorCount::Count(3),
            max_generations: 100,
        },
        77,
    )
    .unwrap();

    let scores = Table(vec![1.5, 0.2, 3.7]);
    population.advance_generation(&scores).unwrap();
    population.advance_generation(&scores).unwrap();
    population.step(&scores).unwrap();
    assert_eq!(population.step(&scores).unwrap(), PopulationState::Ranked);
    assert_eq!(population.layers(), &[4, 3, 2]);

    let text = checkpoint::encode(&population).unwrap();
    let saved = checkpoint::decode(&text, &registry).unwrap();

    assert_eq!(saved.generation, 2);
    assert_eq!(saved.records.len(), 3);
    assert_eq!(saved.morphology.tag, "Biped");
    assert_eq!(saved.activation, Activation::Tanh);

    let mut restored_scores: Vec<f64> = saved.records.iter().map(|r| r.score).collect();
    restored_scores.sort_by(f64::total_cmp);
    assert_eq!(restored_scores, vec![0.2, 1.5, 3.7]);

    let original = population
        .individuals()
        .iter()
        .find(|i| i.score() == Some(0.2))
        .unwrap();
    let record = saved.records.iter().find(|r| r.score == 0.2).unwrap();
    for (a, b) in original.brain().weights().iter().zip(record.brain.weights()) {
        assert_eq!(a.dim(), b.dim());
        assert!(a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-9));
    }
}

#[test]
fn test_checkpoint_and_resume_on_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let settings = PopulationSettings {
        size: 8,
        survivors: SurvivorCount::Fraction(0.25),
        max_generations: 2,
    };
    let task = TaskParams {
        start: Vec2::new(0.0, 1.0),
        target: Vec2::new(6.0, 1.0),
        terrain_seed: 5,
        roughness: 15.0,
    };
    let evaluator = TrialEvaluator::new(
        TrialRunner::new(TrialSettings {
            max_steps: 40,
            ..TrialSettings::default()
        }),
        SandboxEnv::new,
    );

    let mut population = Population::seed(
        Arc::new(Morphology::cubotron1000()),
        &[5],
        Activation::Tanh,
        settings.clone(),
        31,
    )
    .unwrap()
    .with_tasks(TaskPlan::fixed(task.clone()));

    let manager = CheckpointManager::new(dir.path(), 1, 0);
    population.run(&evaluator, Some(&manager)).unwrap();
    assert_eq!(population.state(), PopulationState::Terminal);

    let run_dir = manager.directory_for(&population);
    let latest = checkpoint::find_latest(&run_dir).unwrap().unwrap();
    assert!(latest.ends_with("gen2.txt"));
    assert!(run_dir.join("gen1.txt").exists());
    assert!(!run_dir.join("gen0.txt").exists());

    let saved = checkpoint::load(&latest, &MorphologyRegistry::with_builtins()).unwrap();
    assert_eq!(saved.pop_id, population.pop_id());
    assert_eq!(saved.seed, Some(31));
    assert_eq!(saved.records.len(), 2);
    assert_eq!(saved.stats.as_ref().map(|s| s.snapshots.len()), Some(3));

    let mut resumed = Population::restore(
        saved,
        PopulationSettings {
            max_generations: 4,
            ..settings
        },
    )
    .unwrap()
    .with_tasks(TaskPlan::fixed(task));
    assert_eq!(resumed.state(), PopulationState::Ranked);
    assert_eq!(resumed.generation(), 2);

    assert_eq!(resumed.step(&evaluator).unwrap(), PopulationState::Bred);
    assert_eq!(resumed.generation(), 3);
    assert_eq!(resumed.len(), 8);

    assert_eq!(resumed.advance_generation(&evaluator).unwrap(), PopulationState::Bred);
    assert_eq!(resumed.history().snapshots.len(), 4);
}

#[test]
fn test_walking_left_mirrors_walking_right() {
    let morphology = Arc::new(Morphology::boulotron2000());
    let mut rng = ChaCha8Rng::seed_from_u64(8);
    let mut individual = Individual::random(
        IndividualId(0),
        morphology,
        &[8],
        Activation::Tanh,
        "Test",
        &mut rng,
    )
    .unwrap();

    let runner = TrialRunner::new(TrialSettings {
        max_steps: 120,
        ..TrialSettings::default()
    });
    let right = TaskParams {
        start: Vec2::new(0.0, 1.0),
        target: Vec2::new(10.0, 1.0),
        terrain_seed: 0,
        roughness: 0.0,
    };
    let left = TaskParams {
        target: Vec2::new(-10.0, 1.0),
        ..right.clone()
    };

    let mut env = SandboxEnv::new();
    let a = runner.run(&mut individual, &mut env, &right).unwrap();
    let b = runner.run(&mut individual, &mut env, &left).unwrap();

    assert_eq!(a.steps, b.steps);
    assert_eq!(a.termination, b.termination);
    assert!((a.score - b.score).abs() < 1e-6);
    assert!(env.contact_map().is_empty());
}

#[test]
fn test_same_seed_same_run() {
    let run = || {
        let mut population = Population::seed(
            Arc::new(Morphology::cubotron1000()),
            &[4],
            Activation::Tanh,
            PopulationSettings {
                size: 6,
                survivors: SurvivorCount::Count(2),
                max_generations: 100,
            },
            99,
        )
        .unwrap();
        let evaluator = TrialEvaluator::new(
            TrialRunner::new(TrialSettings {
                max_steps: 30,
                ..TrialSettings::default()
            }),
            SandboxEnv::new,
        );
        for _ in 0..3 {
            population.advance_generation(&evaluator).unwrap();
        }
        checkpoint::encode(&population).unwrap()
    };

    assert_eq!(run(), run());
}
