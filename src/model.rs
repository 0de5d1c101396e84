//! The TISK model
//!
//! [`TiskModel`] ties a lexicon and a [`ModelConfig`] to a set of weights.
//! A fresh model is unwired: [`TiskModel::wire`] derives the weights from
//! the lexicon, or [`TiskModel::from_bundle`] restores trained ones.
//! Anything that simulates fails with [`TiskError::NotWired`] until then,
//! and [`TiskModel::reconfigure`] drops the weights again.

use crate::bundle::{self, WeightBundle};
use crate::engine::{Engine, Trajectories};
use crate::error::{Result, TiskError};
use crate::lexicon::Lexicon;
use crate::measure::{
    category_curves, classify, mean_category_counts, Categories, CategoryCounts, CategoryMode,
    ReactionTimes, RtCriteria, RtSummary,
};
use crate::params::ModelConfig;
use crate::pattern::{ActivationRatios, Pronunciation};
use crate::report::{ItemResult, RunListReport};
use crate::weights::WeightMatrices;
use ndarray::Array1;
use std::path::Path;
use std::time::Instant;

/// Default number of items simulated per batch in [`TiskModel::run_list`]
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Options for [`TiskModel::run_list`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunListOptions {
    pub criteria: RtCriteria,
    /// Items per simulation batch; bounds memory, never changes results
    pub batch_size: usize,
    /// Keep every item's trajectories in the report (needed for raw tables)
    pub keep_trajectories: bool,
    pub category_mode: CategoryMode,
}

impl Default for RunListOptions {
    fn default() -> Self {
        Self {
            criteria: RtCriteria::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            keep_trajectories: false,
            category_mode: CategoryMode::default(),
        }
    }
}

/// One unit's time series to pull out of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit<'a> {
    Phoneme { symbol: &'a str, slot: usize },
    Diphone { first: &'a str, second: &'a str },
    /// Diphone by its display label (`"pa"`, or `"ch a"` for long symbols)
    DiphoneLabel(&'a str),
    SinglePhone(&'a str),
    Word(&'a str),
}

#[derive(Clone, Debug)]
pub struct TiskModel {
    lexicon: Lexicon,
    config: ModelConfig,
    weights: Option<WeightMatrices>,
    /// Overlapping categories of every lexicon word, when restored from a bundle
    category_index: Option<Vec<Categories>>,
}

impl TiskModel {
    /// Unwired model; fails when the config does not fit the lexicon
    pub fn new(lexicon: Lexicon, config: ModelConfig) -> Result<Self> {
        config.validate(&lexicon)?;
        Ok(Self {
            lexicon,
            config,
            weights: None,
            category_index: None,
        })
    }

    /// Wired model with hand-derived weights
    pub fn wired(lexicon: Lexicon, config: ModelConfig) -> Result<Self> {
        let mut model = Self::new(lexicon, config)?;
        model.wire();
        Ok(model)
    }

    /// Runnable model from a trained weight bundle
    pub fn from_bundle(bundle: WeightBundle) -> Result<Self> {
        bundle.config.validate(&bundle.lexicon)?;
        bundle.weights.validate_shapes(&bundle.lexicon, bundle.config.time_slots)?;
        Ok(Self {
            lexicon: bundle.lexicon,
            config: bundle.config,
            weights: Some(bundle.weights),
            category_index: Some(bundle.categories),
        })
    }

    pub fn load_bundle(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bundle(bundle::load_from_file(path)?)
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn is_wired(&self) -> bool {
        self.weights.is_some()
    }

    pub fn weights(&self) -> Result<&WeightMatrices> {
        self.weights.as_ref().ok_or(TiskError::NotWired)
    }

    /// Swap in a new config. The weights are dropped; call [`wire`](Self::wire)
    /// before simulating again.
    pub fn reconfigure(&mut self, config: ModelConfig) -> Result<()> {
        config.validate(&self.lexicon)?;
        self.config = config;
        self.weights = None;
        self.category_index = None;
        Ok(())
    }

    /// Derive every weight matrix from the lexicon and current config
    pub fn wire(&mut self) {
        let start = Instant::now();
        self.weights = Some(WeightMatrices::build(&self.lexicon, &self.config));
        log::debug!(
            "Wired {} phonemes, {} diphones, {} words in {:.3}s",
            self.lexicon.phoneme_count(),
            self.lexicon.diphone_count(),
            self.lexicon.word_count(),
            start.elapsed().as_secs_f64()
        );
    }

    fn engine(&self) -> Result<Engine<'_>> {
        Engine::new(&self.lexicon, self.weights()?, &self.config)
    }

    // ------------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------------

    /// Simulate one pronunciation with optional per-slot activation ratios
    pub fn run(&self, pronunciation: &Pronunciation, ratios: &ActivationRatios) -> Result<Trajectories> {
        self.engine()?.run(pronunciation, ratios)
    }

    /// Parse and simulate a pronunciation string
    pub fn simulate(&self, text: &str) -> Result<Trajectories> {
        let pronunciation = Pronunciation::parse(&self.lexicon, text)?;
        self.run(&pronunciation, &ActivationRatios::new())
    }

    /// Simulate several pronunciations in one batch
    pub fn run_batch(&self, pronunciations: &[Pronunciation]) -> Result<Vec<Trajectories>> {
        self.engine()?.run_batch(pronunciations)
    }

    /// Simulate a list of lexicon words in chunks, measuring RTs and
    /// category curves for each
    pub fn run_list<S: AsRef<str>>(&self, items: &[S], options: &RunListOptions) -> Result<RunListReport> {
        let engine = self.engine()?;
        if items.is_empty() {
            log::warn!("run_list called with an empty item list");
        }

        let targets = items
            .iter()
            .map(|item| self.lexicon.word_index(item.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let pronunciations: Vec<Pronunciation> = targets
            .iter()
            .map(|&t| Pronunciation::word(&self.lexicon, t))
            .collect();

        let batch_size = options.batch_size.max(1);
        let start = Instant::now();
        let mut results = Vec::with_capacity(items.len());
        let mut kept = Vec::new();

        for (chunk_idx, chunk) in pronunciations.chunks(batch_size).enumerate() {
            let trajectories = engine.run_batch(chunk)?;
            let offset = chunk_idx * batch_size;

            for (i, trajectory) in trajectories.into_iter().enumerate() {
                let item = offset + i;
                let target = targets[item];
                let categories = self.word_categories(target, options.category_mode);
                let word = trajectory.word.view();
                results.push(ItemResult {
                    label: items[item].as_ref().to_string(),
                    target,
                    reaction_times: ReactionTimes::measure(word, target, &options.criteria),
                    category_curves: category_curves(word, &categories),
                    categories,
                });
                if options.keep_trajectories {
                    kept.push(trajectory);
                }
            }
        }

        let elapsed = start.elapsed();
        log::info!(
            "Simulation time: {:.3}s ({:.3}s per item)",
            elapsed.as_secs_f64(),
            elapsed.as_secs_f64() / items.len().max(1) as f64
        );

        let times: Vec<ReactionTimes> = results.iter().map(|r| r.reaction_times).collect();
        Ok(RunListReport {
            cycles: self.config.total_cycles(),
            summary: RtSummary::from_times(&times),
            items: results,
            trajectories: kept,
            elapsed,
        })
    }

    // ------------------------------------------------------------------------
    // Measurement
    // ------------------------------------------------------------------------

    /// Reaction times of lexicon word `label` in a run
    pub fn reaction_times(&self, label: &str, trajectories: &Trajectories, criteria: &RtCriteria) -> Result<ReactionTimes> {
        let target = self.lexicon.word_index(label)?;
        Ok(ReactionTimes::measure(trajectories.word.view(), target, criteria))
    }

    /// Category lists of a pronunciation against the lexicon
    pub fn categories(&self, pronunciation: &Pronunciation, mode: CategoryMode) -> Result<Categories> {
        let phonemes = pronunciation.phonemes().ok_or_else(|| {
            TiskError::Config(format!(
                "ambiguous pronunciation {:?} has no category list",
                pronunciation.label()
            ))
        })?;
        if let Some(word) = self.lexicon.find_word(&phonemes) {
            return Ok(self.word_categories(word, mode));
        }
        Ok(classify(&self.lexicon, &phonemes, mode))
    }

    fn word_categories(&self, word: usize, mode: CategoryMode) -> Categories {
        match (&self.category_index, mode) {
            (Some(index), CategoryMode::Overlapping) if word < index.len() => index[word].clone(),
            _ => classify(&self.lexicon, &self.lexicon.word(word).phonemes, mode),
        }
    }

    /// Mean competitor counts over a list of lexicon words
    pub fn mean_category_counts<S: AsRef<str>>(&self, items: &[S], mode: CategoryMode) -> Result<CategoryCounts> {
        let targets = items
            .iter()
            .map(|item| self.lexicon.encode(item.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(mean_category_counts(&self.lexicon, &targets, mode))
    }

    /// Activation over time of one unit in a run
    pub fn series(&self, trajectories: &Trajectories, unit: Unit<'_>) -> Result<Array1<f64>> {
        let column = match unit {
            Unit::Phoneme { symbol, slot } => {
                if slot >= self.config.time_slots {
                    return Err(TiskError::SlotOutOfRange {
                        slot,
                        limit: self.config.time_slots,
                    });
                }
                let phoneme = self.lexicon.phonemes().lookup(symbol)?;
                trajectories
                    .phoneme
                    .column(slot * self.lexicon.phoneme_count() + phoneme)
            }
            Unit::Diphone { first, second } => {
                trajectories.diphone.column(self.lexicon.diphone_index(first, second)?)
            }
            Unit::DiphoneLabel(label) => trajectories.diphone.column(self.lexicon.diphone_by_label(label)?),
            Unit::SinglePhone(symbol) => trajectories
                .single_phone
                .column(self.lexicon.phonemes().lookup(symbol)?),
            Unit::Word(label) => trajectories.word.column(self.lexicon.word_index(label)?),
        };
        Ok(column.to_owned())
    }
}
