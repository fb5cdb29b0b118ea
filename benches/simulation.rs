//! Performance benchmarks for NEURANIM

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use neuranim::checkpoint;
use neuranim::evolution::SurvivorCount;
use neuranim::neural::MutationConfig;
use neuranim::{
    Activation, Individual, IndividualId, Morphology, MorphologyRegistry, NeuralNet, Population,
    PopulationSettings, SandboxEnv, TaskParams, TrialEvaluator, TrialRunner, TrialSettings,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

fn benchmark_neural_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("neural_forward");
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for hidden in [8usize, 30, 100].iter() {
        let net = NeuralNet::random(&[15, *hidden, *hidden, 6], Activation::Tanh, &mut rng).unwrap();
        let inputs = [0.5f64; 15];

        group.bench_with_input(BenchmarkId::new("hidden", hidden), hidden, |b, _| {
            b.iter(|| net.feed(black_box(&inputs)))
        });
    }

    group.finish();
}

fn benchmark_mutation(c: &mut Criterion) {
    let config = MutationConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut net = NeuralNet::random(&[15, 30, 30, 6], Activation::Tanh, &mut rng).unwrap();

    c.bench_function("neural_mutation", |b| {
        b.iter(|| net.mutate_with(&config, &mut rng));
    });
}

fn benchmark_trial(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut individual = Individual::random(
        IndividualId(0),
        Arc::new(Morphology::boulotron2000()),
        &[30, 30],
        Activation::Tanh,
        "Bench",
        &mut rng,
    )
    .unwrap();
    let runner = TrialRunner::new(TrialSettings::default());
    let task = TaskParams::default();
    let mut env = SandboxEnv::new();

    c.bench_function("sandbox_trial", |b| {
        b.iter(|| runner.run(&mut individual, &mut env, black_box(&task)).unwrap());
    });
}

fn benchmark_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("generation");
    group.sample_size(10);

    for size in [50usize, 200].iter() {
        let evaluator = TrialEvaluator::new(
            TrialRunner::new(TrialSettings {
                max_steps: 200,
                ..TrialSettings::default()
            }),
            SandboxEnv::new,
        );
        let mut population = Population::seed(
            Arc::new(Morphology::boulotron2000()),
            &[30, 30],
            Activation::Tanh,
            PopulationSettings {
                size: *size,
                survivors: SurvivorCount::Fraction(0.1),
                max_generations: u32::MAX,
            },
            42,
        )
        .unwrap();

        group.bench_with_input(BenchmarkId::new("population", size), size, |b, _| {
            b.iter(|| population.advance_generation(&evaluator).unwrap());
        });
    }

    group.finish();
}

fn benchmark_serializer(c: &mut Criterion) {
    let evaluator = TrialEvaluator::new(
        TrialRunner::new(TrialSettings {
            max_steps: 50,
            ..TrialSettings::default()
        }),
        SandboxEnv::new,
    );
    let mut population = Population::seed(
        Arc::new(Morphology::boulotron2000()),
        &[30, 30],
        Activation::Tanh,
        PopulationSettings {
            size: 100,
            survivors: SurvivorCount::Count(15),
            max_generations: 10,
        },
        42,
    )
    .unwrap();
    population.step(&evaluator).unwrap();
    population.step(&evaluator).unwrap();

    c.bench_function("population_encode", |b| {
        b.iter(|| checkpoint::encode(black_box(&population)).unwrap());
    });

    let text = checkpoint::encode(&population).unwrap();
    let registry = MorphologyRegistry::with_builtins();

    c.bench_function("population_decode", |b| {
        b.iter(|| checkpoint::decode(black_box(&text), &registry).unwrap());
    });
}

criterion_group!(
    benches,
    benchmark_neural_forward,
    benchmark_mutation,
    benchmark_trial,
    benchmark_generation,
    benchmark_serializer,
);

criterion_main!(benches);
