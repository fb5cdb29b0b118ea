//! NEURANIM - CLI Entry Point
//!
//! Evolves walking controllers on the sandbox environment.

use clap::{Parser, Subcommand};
use neuranim::checkpoint::{self, CheckpointManager};
use neuranim::evolution::EvolutionEngine;
use neuranim::population::TaskPlan;
use neuranim::{
    benchmark, Config, Population, PopulationSettings, SandboxEnv, TrialEvaluator, TrialRunner,
};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "neuranim")]
#[command(version)]
#[command(about = "Neuroevolution of symmetric walking controllers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evolve a new population
    Run {
        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Last generation to evaluate (overrides the config)
        #[arg(short, long)]
        generations: Option<u32>,

        /// Output directory for generation files
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Quiet mode (warnings only)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Resume from a generation file or the latest one in a directory
    Resume {
        /// Generation file or directory
        #[arg(short, long)]
        file: PathBuf,

        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Number of additional generations
        #[arg(short, long)]
        generations: Option<u32>,

        /// Random seed (defaults to the one stored in the file)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run performance benchmark
    Benchmark {
        /// Number of generations
        #[arg(short, long, default_value = "5")]
        generations: u32,

        /// Population size
        #[arg(short, long, default_value = "100")]
        population: usize,
    },

    /// Generate default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },

    /// Summarize a generation file
    Analyze {
        /// Generation file
        file: PathBuf,

        /// Configuration declaring extra morphologies
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            generations,
            output,
            seed,
            quiet,
        } => {
            let config = load_config(&config)?;
            init_logging(if quiet { "warn" } else { &config.logging.log_level });
            run_evolution(config, generations, output, seed)
        }

        Commands::Resume {
            file,
            config,
            generations,
            seed,
        } => {
            let config = load_config(&config)?;
            init_logging(&config.logging.log_level);
            resume_evolution(config, file, generations, seed)
        }

        Commands::Benchmark {
            generations,
            population,
        } => {
            init_logging("warn");
            run_benchmark(generations, population)
        }

        Commands::Init { output } => generate_config(output),

        Commands::Analyze { file, config } => {
            let config = load_config(&config)?;
            init_logging(&config.logging.log_level);
            analyze_file(&config, file)
        }
    }
}

/// `RUST_LOG` wins over the configured level
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        println!("Loading config from: {:?}", path);
        Ok(Config::from_file(path)?)
    } else {
        Ok(Config::default())
    }
}

fn evaluator(config: &Config) -> TrialEvaluator<fn() -> SandboxEnv> {
    TrialEvaluator::new(
        TrialRunner::new(config.trial.settings()),
        SandboxEnv::new as fn() -> SandboxEnv,
    )
}

fn run_evolution(
    mut config: Config,
    generations: Option<u32>,
    output: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(g) = generations {
        config.evolution.max_generations = g;
    }
    if let Some(dir) = output {
        config.logging.output_dir = dir;
    }
    config.validate()?;

    let seed = seed.unwrap_or_else(rand::random);
    let mut population = Population::from_config(&config, seed)?.with_history_note(format!(
        "started from scratch with seed {}",
        seed
    ));

    println!("Starting evolution");
    println!("  Population: {} ({})", population.pop_id(), population.morphology().tag);
    println!("  Layers: {:?}", population.layers());
    println!("  Size: {}", population.len());
    println!("  Seed: {}", seed);
    println!();

    let manager = CheckpointManager::from_config(&config.logging);
    let start = Instant::now();
    population.run(&evaluator(&config), Some(&manager))?;

    finish(&population, &manager, start)
}

fn resume_evolution(
    config: Config,
    file: PathBuf,
    generations: Option<u32>,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = checkpoint::find_latest(&file)?
        .ok_or_else(|| format!("no generation file found in {:?}", file))?;
    println!("Loading population: {:?}", path);

    let mut saved = checkpoint::load(&path, &config.registry()?)?;
    if seed.is_some() {
        saved.seed = seed;
    }
    let max_generations = match generations {
        Some(extra) => saved.generation.saturating_add(extra),
        None => config.evolution.max_generations,
    };
    let settings = PopulationSettings {
        size: config.population.size,
        survivors: config.population.survivors,
        max_generations,
    };

    let population = Population::restore(saved, settings)?;
    let tasks = TaskPlan::from_config(&config, population.rng_seed());
    let mut population = population
        .with_engine(EvolutionEngine::from_config(&config))
        .with_tasks(tasks);

    println!(
        "Resumed {} at generation {} with {} survivors",
        population.pop_id(),
        population.generation(),
        population.len()
    );
    println!("Seed: {}", population.rng_seed());
    println!("Running until generation {}", max_generations);
    println!();

    let manager = CheckpointManager::from_config(&config.logging);
    let start = Instant::now();
    population.run(&evaluator(&config), Some(&manager))?;

    finish(&population, &manager, start)
}

fn finish(
    population: &Population,
    manager: &CheckpointManager,
    start: Instant,
) -> Result<(), Box<dyn std::error::Error>> {
    let elapsed = start.elapsed();

    println!();
    println!("=== Evolution Complete ===");
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Generation: {}", population.generation());
    if let Some(best) = population.history().best_ever() {
        println!("Best score: {:.3} (generation {})", best.best, best.generation);
    }

    let dir = manager.directory_for(population);
    std::fs::create_dir_all(&dir)?;
    let stats_path = dir.join("stats_history.json");
    population.history().save(&stats_path)?;
    println!("Stats history: {:?}", stats_path);

    Ok(())
}

fn run_benchmark(generations: u32, population: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== NEURANIM Benchmark ===");
    println!("Generations: {}", generations);
    println!("Population: {}", population);
    println!();

    let result = benchmark(generations, population)?;
    println!("{}", result);

    Ok(())
}

fn generate_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    config.save(&output)?;
    println!("Configuration saved to: {:?}", output);
    Ok(())
}

fn analyze_file(config: &Config, file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Population Analysis ===");
    println!("File: {:?}", file);
    println!();

    let saved = checkpoint::load(&file, &config.registry()?)?;

    println!("Morphology: {}", saved.morphology.tag);
    println!("Lineage: {}", saved.pop_id);
    println!("Layers: {:?} ({})", saved.layers, saved.activation);
    println!("Generation: {}", saved.generation);
    if !saved.history_note.is_empty() {
        println!("History: {}", saved.history_note);
    }
    println!("Individuals: {}", saved.records.len());

    let scores: Vec<f64> = saved
        .records
        .iter()
        .map(|r| r.score)
        .filter(|s| s.is_finite())
        .collect();
    if !scores.is_empty() {
        let best = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        println!("Best score: {:.3}", best);
        println!("Mean score: {:.3}", mean);
    }

    let disabled: usize = saved.records.iter().map(|r| r.brain.disabled_count()).sum();
    let synapses: usize = saved.records.iter().map(|r| r.brain.total_synapses()).sum();
    if synapses > 0 {
        println!(
            "Disabled synapses: {} ({:.1}%)",
            disabled,
            100.0 * disabled as f64 / synapses as f64
        );
    }

    match (&saved.stats, &saved.raw_stats) {
        (Some(stats), _) => {
            println!();
            println!("Recorded generations: {}", stats.snapshots.len());
            if let Some(best) = stats.best_ever() {
                println!("Best ever: {:.3} (generation {})", best.best, best.generation);
            }
        }
        (None, Some(raw)) => println!("Unparsed stats: {}", raw),
        (None, None) => {}
    }

    Ok(())
}
