//! Population files: text serializer and checkpoint management.
//!
//! A population file is a header of `key: value` lines followed by one record
//! per individual:
//!
//! ```text
//! type: Boulotron2000
//! layers: [15,30,30,6]
//! neurons: 81
//! synapses: 1530
//! activation: tanh
//! generation: 40
//! population: Brave-Otter
//! seed: 42
//! history: started from scratch
//! stats: {"snapshots":[...]}
//!
//! ####
//! score: 12.5
//! [[0.1,-0.5,...],...]
//! [[...],...]
//!
//! ```
//!
//! Weight matrices are JSON nested lists, one per line, in layer order.

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use crate::morphology::{Morphology, MorphologyRegistry};
use crate::neural::{total_neurons, total_synapses, Activation, NeuralNet};
use crate::population::Population;
use crate::stats::StatsHistory;
use ndarray::Array2;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Marks the start of every record
pub const RECORD_DELIMITER: &str = "####";

/// One saved individual
#[derive(Debug, Clone)]
pub struct SavedRecord {
    pub score: f64,
    pub brain: NeuralNet,
}

/// Decoded population file
#[derive(Debug, Clone)]
pub struct SavedPopulation {
    pub morphology: Arc<Morphology>,
    pub layers: Vec<usize>,
    pub activation: Activation,
    pub generation: u32,
    pub pop_id: String,
    pub history_note: String,
    /// Run seed, absent in files written before it was recorded
    pub seed: Option<u64>,
    /// Parsed statistics blob
    pub stats: Option<StatsHistory>,
    /// Statistics blob that could not be parsed, kept verbatim
    pub raw_stats: Option<String>,
    pub records: Vec<SavedRecord>,
}

/// Render the current pool of `population`
pub fn encode(population: &Population) -> Result<String> {
    let layers = population.layers();
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "type: {}", population.morphology().tag);
    let _ = writeln!(out, "layers: {}", serde_json::to_string(layers)?);
    let _ = writeln!(out, "neurons: {}", total_neurons(layers));
    let _ = writeln!(out, "synapses: {}", total_synapses(layers));
    let _ = writeln!(out, "activation: {}", population.activation());
    let _ = writeln!(out, "generation: {}", population.generation());
    let _ = writeln!(out, "population: {}", population.pop_id());
    let _ = writeln!(out, "seed: {}", population.rng_seed());
    let _ = writeln!(out, "history: {}", population.history_note().replace('\n', " "));
    let _ = writeln!(out, "stats: {}", population.history().to_blob()?);
    out.push('\n');

    for individual in population.individuals() {
        let _ = writeln!(out, "{}", RECORD_DELIMITER);
        let _ = writeln!(out, "score: {}", individual.score().unwrap_or(f64::INFINITY));
        for w in individual.brain().weights() {
            let rows: Vec<Vec<f64>> = w.rows().into_iter().map(|r| r.to_vec()).collect();
            let _ = writeln!(out, "{}", serde_json::to_string(&rows)?);
        }
        out.push('\n');
    }

    Ok(out)
}

/// Write the current pool of `population` to `path`
pub fn save<P: AsRef<Path>>(population: &Population, path: P) -> Result<()> {
    std::fs::write(path, encode(population)?)?;
    Ok(())
}

/// Read a population file, resolving its morphology through `registry`
pub fn load<P: AsRef<Path>>(path: P, registry: &MorphologyRegistry) -> Result<SavedPopulation> {
    let text = std::fs::read_to_string(path)?;
    decode(&text, registry)
}

#[derive(Default)]
struct Header {
    tag: Option<String>,
    layers: Option<Vec<usize>>,
    neurons: Option<usize>,
    synapses: Option<usize>,
    activation: Option<Activation>,
    generation: Option<u32>,
    pop_id: String,
    history_note: String,
    seed: Option<u64>,
    stats: Option<StatsHistory>,
    raw_stats: Option<String>,
}

fn parse_number<T: std::str::FromStr>(value: &str, line: usize, field: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::malformed(line, format!("invalid {}: {:?}", field, value)))
}

fn parse_header_line(header: &mut Header, text: &str, line: usize) -> Result<()> {
    let (key, value) = text
        .split_once(':')
        .ok_or_else(|| Error::malformed(line, format!("expected `key: value`, found {:?}", text)))?;
    let value = value.trim();

    match key.trim() {
        "type" => header.tag = Some(value.to_string()),
        "layers" => {
            let layers: Vec<usize> = serde_json::from_str(value)
                .map_err(|e| Error::malformed(line, format!("invalid layer list: {}", e)))?;
            header.layers = Some(layers);
        }
        "neurons" => header.neurons = Some(parse_number(value, line, "neuron count")?),
        "synapses" => header.synapses = Some(parse_number(value, line, "synapse count")?),
        "activation" => {
            let activation = value
                .parse()
                .map_err(|e: Error| Error::malformed(line, e.to_string()))?;
            header.activation = Some(activation);
        }
        "generation" => header.generation = Some(parse_number(value, line, "generation")?),
        "population" => header.pop_id = value.to_string(),
        "seed" => header.seed = Some(parse_number(value, line, "seed")?),
        "history" => header.history_note = value.to_string(),
        "stats" => match StatsHistory::from_blob(value) {
            Ok(stats) => header.stats = Some(stats),
            Err(e) => {
                log::warn!("line {}: keeping unparsable stats blob as text ({})", line, e);
                header.raw_stats = Some(value.to_string());
            }
        },
        other => log::warn!("line {}: ignoring unknown header field {:?}", line, other),
    }
    Ok(())
}

fn required<T>(value: Option<T>, field: &str, line: usize) -> Result<T> {
    value.ok_or_else(|| Error::malformed(line, format!("missing header field `{}`", field)))
}

fn parse_matrix(text: &str, line: usize, rows: usize, cols: usize) -> Result<Array2<f64>> {
    let nested: Vec<Vec<f64>> = serde_json::from_str(text)
        .map_err(|e| Error::malformed(line, format!("invalid weight literal: {}", e)))?;
    if nested.len() != rows || nested.iter().any(|r| r.len() != cols) {
        let found_cols = nested.first().map_or(0, |r| r.len());
        return Err(Error::malformed(
            line,
            format!(
                "weight matrix is {}x{}, header declares {}x{}",
                nested.len(),
                found_cols,
                rows,
                cols
            ),
        ));
    }
    let flat: Vec<f64> = nested.into_iter().flatten().collect();
    Array2::from_shape_vec((rows, cols), flat).map_err(|e| Error::malformed(line, e.to_string()))
}

struct PendingRecord {
    line: usize,
    score: Option<f64>,
    weights: Vec<Array2<f64>>,
}

fn finish_record(
    pending: PendingRecord,
    layers: &[usize],
    activation: Activation,
) -> Result<SavedRecord> {
    let score = required(pending.score, "score", pending.line)?;
    if pending.weights.len() != layers.len() - 1 {
        return Err(Error::malformed(
            pending.line,
            format!(
                "record has {} weight matrices, header declares {}",
                pending.weights.len(),
                layers.len() - 1
            ),
        ));
    }
    let brain = NeuralNet::from_weights(pending.weights, activation)
        .map_err(|e| Error::malformed(pending.line, e.to_string()))?;
    Ok(SavedRecord { score, brain })
}

/// Parse a population file.
///
/// Every inconsistency is an error: nothing is defaulted.
pub fn decode(text: &str, registry: &MorphologyRegistry) -> Result<SavedPopulation> {
    let lines: Vec<&str> = text.lines().collect();
    let body_start = lines
        .iter()
        .position(|l| l.trim() == RECORD_DELIMITER)
        .unwrap_or(lines.len());

    let mut header = Header::default();
    for (i, raw) in lines[..body_start].iter().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        parse_header_line(&mut header, trimmed, i + 1)?;
    }

    let at = body_start + 1;
    let tag = required(header.tag, "type", at)?;
    let layers = required(header.layers, "layers", at)?;
    let neurons = required(header.neurons, "neurons", at)?;
    let synapses = required(header.synapses, "synapses", at)?;
    let activation = required(header.activation, "activation", at)?;
    let generation = required(header.generation, "generation", at)?;

    if layers.len() < 2 || layers.contains(&0) {
        return Err(Error::malformed(at, format!("invalid layer list {:?}", layers)));
    }
    if neurons != total_neurons(&layers) {
        return Err(Error::malformed(
            at,
            format!("neurons is {}, layers give {}", neurons, total_neurons(&layers)),
        ));
    }
    if synapses != total_synapses(&layers) {
        return Err(Error::malformed(
            at,
            format!("synapses is {}, layers give {}", synapses, total_synapses(&layers)),
        ));
    }

    let morphology = registry.get(&tag)?;
    let (input, output) = (layers[0], layers[layers.len() - 1]);
    if input != morphology.input_width() || output != morphology.output_width() {
        return Err(Error::malformed(
            at,
            format!(
                "layers {:?} do not fit {} (input {}, output {})",
                layers,
                morphology.tag,
                morphology.input_width(),
                morphology.output_width()
            ),
        ));
    }

    let mut records = Vec::new();
    let mut pending: Option<PendingRecord> = None;
    for (i, raw) in lines.iter().enumerate().skip(body_start) {
        let line = i + 1;
        let trimmed = raw.trim();

        if trimmed == RECORD_DELIMITER {
            if let Some(done) = pending.take() {
                records.push(finish_record(done, &layers, activation)?);
            }
            pending = Some(PendingRecord {
                line,
                score: None,
                weights: Vec::new(),
            });
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }

        let record = pending
            .as_mut()
            .ok_or_else(|| Error::malformed(line, "content outside a record"))?;
        if let Some(value) = trimmed.strip_prefix("score:") {
            if record.score.is_some() {
                return Err(Error::malformed(line, "duplicate score field"));
            }
            record.score = Some(parse_number(value.trim(), line, "score")?);
        } else if trimmed.starts_with('[') {
            let k = record.weights.len();
            if k + 1 >= layers.len() {
                return Err(Error::malformed(
                    line,
                    format!("more than {} weight matrices in record", layers.len() - 1),
                ));
            }
            record
                .weights
                .push(parse_matrix(trimmed, line, layers[k] + 1, layers[k + 1])?);
        } else {
            return Err(Error::malformed(line, format!("unexpected content {:?}", trimmed)));
        }
    }
    if let Some(done) = pending.take() {
        records.push(finish_record(done, &layers, activation)?);
    }

    log::debug!(
        "Decoded {} records of {} at generation {}",
        records.len(),
        morphology.tag,
        generation
    );

    Ok(SavedPopulation {
        morphology,
        layers,
        activation,
        generation,
        pop_id: header.pop_id,
        history_note: header.history_note,
        seed: header.seed,
        stats: header.stats,
        raw_stats: header.raw_stats,
        records,
    })
}

/// Generation number of a `gen{N}.txt` file name
pub fn generation_of(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .strip_prefix("gen")?
        .strip_suffix(".txt")?
        .parse()
        .ok()
}

/// Highest-generation `gen{N}.txt` in `dir`; a file path is returned as is
pub fn find_latest<P: AsRef<Path>>(dir: P) -> Result<Option<PathBuf>> {
    let dir = dir.as_ref();
    if dir.is_file() {
        return Ok(Some(dir.to_path_buf()));
    }
    let latest = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter_map(|path| generation_of(&path).map(|g| (g, path)))
        .max_by_key(|(g, _)| *g)
        .map(|(_, path)| path);
    Ok(latest)
}

/// Checkpoint manager for automatic saving
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    /// Base directory for checkpoints
    pub base_dir: PathBuf,
    /// Generations between checkpoints (0 disables)
    pub interval: u32,
    /// Files kept per population (0 keeps all)
    pub max_checkpoints: usize,
}

impl CheckpointManager {
    pub fn new<P: Into<PathBuf>>(base_dir: P, interval: u32, max_checkpoints: usize) -> Self {
        Self {
            base_dir: base_dir.into(),
            interval,
            max_checkpoints,
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::new(
            config.output_dir.clone(),
            config.checkpoint_interval,
            config.max_checkpoints,
        )
    }

    /// Check if a checkpoint should be saved
    pub fn should_save(&self, generation: u32) -> bool {
        self.interval > 0 && generation > 0 && generation % self.interval == 0
    }

    /// `<base>/<tag>_<neurons>/<lineage>`, lowercased
    pub fn directory_for(&self, population: &Population) -> PathBuf {
        let kind = format!(
            "{}_{}",
            population.morphology().tag.to_lowercase(),
            total_neurons(population.layers())
        );
        self.base_dir
            .join(kind)
            .join(population.pop_id().to_lowercase())
    }

    pub fn checkpoint_path(&self, population: &Population) -> PathBuf {
        self.directory_for(population)
            .join(format!("gen{}.txt", population.generation()))
    }

    /// Save the current pool and prune old files
    pub fn save(&self, population: &Population) -> Result<PathBuf> {
        let dir = self.directory_for(population);
        std::fs::create_dir_all(&dir)?;
        let path = self.checkpoint_path(population);
        save(population, &path)?;
        log::info!("Saved generation {} to {}", population.generation(), path.display());

        self.cleanup(&dir, &path)?;
        Ok(path)
    }

    /// Remove old checkpoints beyond max limit, least recently written first.
    /// `keep` is never removed.
    fn cleanup(&self, dir: &Path, keep: &Path) -> Result<()> {
        if self.max_checkpoints == 0 {
            return Ok(());
        }
        let mut total = 0;
        let mut others: Vec<(SystemTime, u32, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(generation) = generation_of(&path) else {
                continue;
            };
            total += 1;
            if path == keep {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            others.push((modified, generation, path));
        }

        if total > self.max_checkpoints {
            others.sort();
            let to_remove = (total - self.max_checkpoints).min(others.len());
            for (_, _, path) in others.into_iter().take(to_remove) {
                log::debug!("Removing old checkpoint {}", path.display());
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}
