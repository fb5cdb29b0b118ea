//! Population state machine: Evaluate, Rank/Select, Breed.

use crate::checkpoint::{CheckpointManager, SavedPopulation};
use crate::config::Config;
use crate::environment::{TaskParams, Vec2};
use crate::error::{Error, Result};
use crate::evolution::{self, EvolutionEngine, SurvivorCount};
use crate::individual::{lineage_label, Individual, IndividualId};
use crate::morphology::Morphology;
use crate::neural::Activation;
use crate::stats::{GenerationStats, StatsHistory};
use crate::trial::Evaluator;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Phase of the generation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopulationState {
    /// Fresh pool, nothing evaluated yet
    Seeded,
    /// Every individual has been scored
    Evaluating,
    /// Pool sorted and truncated to the survivors
    Ranked,
    /// Refilled from the survivors; generation counter advanced
    Bred,
    Terminal,
}

/// Cooperative stop flag, checked between individuals
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sizes and limits of the generation loop
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationSettings {
    pub size: usize,
    pub survivors: SurvivorCount,
    /// Terminal once the generation counter exceeds this
    pub max_generations: u32,
}

impl Default for PopulationSettings {
    fn default() -> Self {
        Self {
            size: 200,
            survivors: SurvivorCount::Count(15),
            max_generations: 350,
        }
    }
}

/// Per-generation task parameters
#[derive(Debug, Clone, Default)]
pub struct TaskPlan {
    pub base: TaskParams,
    /// Cycled one per generation when non-empty
    pub targets: Vec<Vec2>,
    /// Draw a fresh terrain seed every generation
    pub vary_terrain: bool,
    pub seed: u64,
}

impl TaskPlan {
    pub fn fixed(base: TaskParams) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    pub fn from_config(config: &Config, seed: u64) -> Self {
        Self {
            base: TaskParams {
                start: config.trial.start,
                target: config.trial.target,
                terrain_seed: seed,
                roughness: config.terrain.roughness,
            },
            targets: config.trial.targets.clone(),
            vary_terrain: config.terrain.vary_per_generation,
            seed,
        }
    }

    /// Task for `generation`, drawn from its own stream so the breeding RNG is untouched
    pub fn for_generation(&self, generation: u32) -> TaskParams {
        let mut task = self.base.clone();
        if !self.targets.is_empty() {
            task.target = self.targets[generation as usize % self.targets.len()];
        }
        if self.vary_terrain {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ u64::from(generation));
            task.terrain_seed = rng.gen();
        }
        task
    }
}

/// The current generation of individuals
pub struct Population {
    // Pool
    individuals: Vec<Individual>,
    morphology: Arc<Morphology>,
    layers: Vec<usize>,
    activation: Activation,
    pop_id: String,

    // State
    generation: u32,
    state: PopulationState,
    stop: StopHandle,

    // Configuration
    settings: PopulationSettings,
    engine: EvolutionEngine,
    tasks: TaskPlan,

    // Statistics
    current: GenerationStats,
    history: StatsHistory,
    history_note: String,

    // ID generation
    next_id: u64,

    // Run seed; each breed draws from its own stream of it
    seed: u64,
}

impl Population {
    /// Fresh random pool for `morphology` with the given hidden layers
    pub fn seed(
        morphology: Arc<Morphology>,
        hidden: &[usize],
        activation: Activation,
        settings: PopulationSettings,
        seed: u64,
    ) -> Result<Self> {
        if settings.size == 0 {
            return Err(Error::EmptyPopulation);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let pop_id = lineage_label(&mut rng);
        let layers = morphology.layer_sizes(hidden);

        let individuals = (0..settings.size)
            .map(|i| {
                Individual::random(
                    IndividualId(i as u64),
                    Arc::clone(&morphology),
                    hidden,
                    activation,
                    pop_id.clone(),
                    &mut rng,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Seeded population {} with {} x {} {:?}",
            pop_id,
            settings.size,
            morphology.tag,
            layers
        );

        Ok(Self {
            next_id: individuals.len() as u64,
            individuals,
            morphology,
            layers,
            activation,
            pop_id,
            generation: 0,
            state: PopulationState::Seeded,
            stop: StopHandle::new(),
            settings,
            engine: EvolutionEngine::default(),
            tasks: TaskPlan::default(),
            current: GenerationStats::new(0),
            history: StatsHistory::new(),
            history_note: String::new(),
            seed,
        })
    }

    /// Build the initial population described by `config`
    pub fn from_config(config: &Config, seed: u64) -> Result<Self> {
        let registry = config.registry()?;
        let morphology = registry.get(&config.population.morphology)?;
        let settings = PopulationSettings {
            size: config.population.size,
            survivors: config.population.survivors,
            max_generations: config.evolution.max_generations,
        };
        Ok(Self::seed(
            morphology,
            &config.population.hidden_layers,
            config.population.activation,
            settings,
            seed,
        )?
        .with_engine(EvolutionEngine::from_config(config))
        .with_tasks(TaskPlan::from_config(config, seed)))
    }

    /// Resume from saved survivors.
    ///
    /// The population starts in [`PopulationState::Ranked`] at the stored
    /// generation with the stored run seed, so the next step breeds exactly as
    /// the saving run would have. Files without a `seed` line fall back to 0.
    pub fn restore(saved: SavedPopulation, settings: PopulationSettings) -> Result<Self> {
        if saved.records.is_empty() {
            return Err(Error::EmptyPopulation);
        }
        let SavedPopulation {
            morphology,
            layers,
            activation,
            generation,
            pop_id,
            history_note,
            seed,
            stats,
            records,
            ..
        } = saved;
        let seed = seed.unwrap_or_else(|| {
            log::warn!("Population {} has no recorded seed, breeding with seed 0", pop_id);
            0
        });

        let mut individuals = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                let mut ind = Individual::new(
                    IndividualId(i as u64),
                    Arc::clone(&morphology),
                    record.brain,
                    pop_id.clone(),
                )?;
                ind.set_score(record.score);
                Ok(ind)
            })
            .collect::<Result<Vec<_>>>()?;
        evolution::rank(&mut individuals);

        log::info!(
            "Restored population {} at generation {} with {} survivors",
            pop_id,
            generation,
            individuals.len()
        );

        let mut current = GenerationStats::new(generation);
        current.update(&individuals);

        Ok(Self {
            next_id: individuals.len() as u64,
            individuals,
            morphology,
            layers,
            activation,
            pop_id,
            generation,
            state: PopulationState::Ranked,
            stop: StopHandle::new(),
            settings,
            engine: EvolutionEngine::default(),
            tasks: TaskPlan::default(),
            current,
            history: stats.unwrap_or_default(),
            history_note,
            seed,
        })
    }

    pub fn with_engine(mut self, engine: EvolutionEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_tasks(mut self, tasks: TaskPlan) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_history_note(mut self, note: impl Into<String>) -> Self {
        self.history_note = note.into();
        self
    }

    /// Advance exactly one state transition
    pub fn step<V: Evaluator>(&mut self, evaluator: &V) -> Result<PopulationState> {
        match self.state {
            PopulationState::Seeded | PopulationState::Bred => {
                if self.generation > self.settings.max_generations {
                    log::info!(
                        "Population {} reached generation limit {}",
                        self.pop_id,
                        self.settings.max_generations
                    );
                    self.state = PopulationState::Terminal;
                } else {
                    self.evaluate(evaluator)?;
                }
            }
            PopulationState::Evaluating => self.rank_and_select()?,
            PopulationState::Ranked => self.breed()?,
            PopulationState::Terminal => {}
        }
        Ok(self.state)
    }

    /// Run Evaluate, Rank/Select and Breed for one generation
    pub fn advance_generation<V: Evaluator>(&mut self, evaluator: &V) -> Result<PopulationState> {
        loop {
            match self.step(evaluator)? {
                PopulationState::Bred | PopulationState::Terminal => return Ok(self.state),
                _ => continue,
            }
        }
    }

    /// Loop until terminal, saving survivors through `checkpoints` when due
    pub fn run<V: Evaluator>(
        &mut self,
        evaluator: &V,
        checkpoints: Option<&CheckpointManager>,
    ) -> Result<()> {
        loop {
            match self.step(evaluator)? {
                PopulationState::Ranked => {
                    if let Some(manager) = checkpoints {
                        if manager.should_save(self.generation) {
                            manager.save(self)?;
                        }
                    }
                }
                PopulationState::Terminal => return Ok(()),
                _ => {}
            }
        }
    }

    /// Score every individual in parallel, one evaluator worker per rayon split.
    ///
    /// Trial failures are logged with the individual's id and scored as
    /// infinitely bad; the generation continues. Any other error clears every
    /// score and leaves the state unchanged.
    fn evaluate<V: Evaluator>(&mut self, evaluator: &V) -> Result<()> {
        let task = self.tasks.for_generation(self.generation);
        let stop = self.stop.clone();

        let results: Vec<Option<Result<f64>>> = self
            .individuals
            .par_iter_mut()
            .map_init(
                || evaluator.worker(),
                |worker, individual| {
                    if stop.is_stop_requested() {
                        return None;
                    }
                    individual.clear_score();
                    Some(evaluator.evaluate(worker, individual, &task))
                },
            )
            .collect();

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Some(Err(e)) if !e.is_trial_local() => {
                    self.individuals.iter_mut().for_each(|i| i.clear_score());
                    return Err(e);
                }
                other => outcomes.push(other),
            }
        }

        let mut failed = 0;
        let mut skipped = 0;
        for (individual, outcome) in self.individuals.iter_mut().zip(outcomes) {
            match outcome {
                Some(Ok(score)) => individual.set_score(score),
                Some(Err(e)) => {
                    log::warn!("{}", e);
                    individual.set_score(f64::INFINITY);
                    failed += 1;
                }
                None => skipped += 1,
            }
        }

        if self.stop.is_stop_requested() {
            log::info!(
                "Stop requested during generation {} ({} individuals not evaluated)",
                self.generation,
                skipped
            );
            self.state = PopulationState::Terminal;
            return Ok(());
        }

        self.current = GenerationStats::new(self.generation);
        self.current.failed = failed;
        self.state = PopulationState::Evaluating;
        Ok(())
    }

    fn rank_and_select(&mut self) -> Result<()> {
        self.current.update(&self.individuals);

        let k = self.settings.survivors.resolve(self.individuals.len());
        let pool = std::mem::take(&mut self.individuals);
        self.individuals = evolution::select(pool, k)?;

        self.current.survivor_cutoff = self.individuals.last().and_then(|i| i.score());
        self.history.record(self.current.clone());
        log::info!("[{}] {}", self.pop_id, self.current.summary());

        self.state = PopulationState::Ranked;
        Ok(())
    }

    /// Breeding stream for the current generation. Stream 0 belongs to the
    /// initial pool.
    fn breeding_rng(&self) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(u64::from(self.generation) + 1);
        rng
    }

    fn breed(&mut self) -> Result<()> {
        let mut rng = self.breeding_rng();
        let survivors = std::mem::take(&mut self.individuals);
        let brood = self
            .engine
            .breed(survivors, self.settings.size, &mut self.next_id, &mut rng)?;
        self.individuals = brood.pool;

        if let Some(last) = self.history.snapshots.last_mut() {
            if last.generation == self.generation {
                last.mutations = brood.mutations;
            }
        }
        log::debug!(
            "Generation {} bred {} individuals ({} mutations)",
            self.generation,
            self.individuals.len(),
            brood.mutations
        );

        self.generation += 1;
        self.state = PopulationState::Bred;
        Ok(())
    }

    /// Individuals of the current generation
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn state(&self) -> PopulationState {
        self.state
    }

    pub fn morphology(&self) -> &Arc<Morphology> {
        &self.morphology
    }

    /// Full layer list of every controller
    pub fn layers(&self) -> &[usize] {
        &self.layers
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Lineage label shared by all individuals
    pub fn pop_id(&self) -> &str {
        &self.pop_id
    }

    /// Seed of the breeding stream
    pub fn rng_seed(&self) -> u64 {
        self.seed
    }

    pub fn settings(&self) -> &PopulationSettings {
        &self.settings
    }

    pub fn tasks(&self) -> &TaskPlan {
        &self.tasks
    }

    pub fn history(&self) -> &StatsHistory {
        &self.history
    }

    pub fn history_note(&self) -> &str {
        &self.history_note
    }

    /// Handle that can stop the run from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Lowest-scored individual, if any has been scored
    pub fn best(&self) -> Option<&Individual> {
        self.individuals
            .iter()
            .filter(|i| i.score().is_some())
            .min_by(|a, b| {
                let (sa, sb) = (a.score().unwrap_or(f64::INFINITY), b.score().unwrap_or(f64::INFINITY));
                sa.total_cmp(&sb)
            })
    }
}
