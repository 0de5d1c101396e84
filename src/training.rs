//! Trained phone → word weights
//!
//! Alternative to the hand-derived diphone → word and single phone → word
//! matrices: each word is a binary feature pattern (its phonemes and its
//! gap-limited diphones) associated with a one-hot word target by batch
//! gradient ascent.
//!
//! # Epoch
//!
//! ```text
//! out   = clip(S · W_sw + Dp · W_dw, 0, 1)
//! err   = I - out
//! W_sw += max(lr · Sᵀ · err, 0)
//! W_dw += max(lr · Dpᵀ · err, 0)
//! ```
//!
//! Increments are clipped at zero, so weights only grow and the target
//! outputs never fall. The remaining matrices (phoneme → diphone, phoneme →
//! single phone, word → word, feedback) are wired separately by
//! [`WeightGenerator::generate_wired_weights`]; a generator cannot be
//! extracted before that call.

use crate::bundle::WeightBundle;
use crate::error::{Result, TiskError};
use crate::lexicon::{DiphoneScheme, Lexicon};
use crate::measure::{category_index, Categories, CategoryMode};
use crate::params::ModelConfig;
use crate::weights::{self, WeightMatrices};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Training schedule
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 1000,
            learning_rate: 0.01,
        }
    }
}

/// Fit of one epoch, measured before that epoch's update
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    /// Mean over words of the per-word RMS error
    pub mse: f64,
    /// Lowest output of a word for its own pattern
    pub target_min: f64,
    /// Highest output of a word for another word's pattern
    pub non_target_max: f64,
}

/// Matrices built by the wiring step
#[derive(Clone, Debug)]
struct WiredWeights {
    phoneme_to_diphone: Array2<f64>,
    phoneme_to_single: Array2<f64>,
    word_to_word: Array2<f64>,
    word_to_diphone: Array2<f64>,
    word_to_single: Array2<f64>,
}

/// Builds, trains and exports a weight bundle
#[derive(Clone, Debug)]
pub struct WeightGenerator {
    lexicon: Lexicon,
    config: ModelConfig,
    /// W × P binary phoneme pattern
    single_pattern: Array2<f64>,
    /// W × D binary diphone pattern
    diphone_pattern: Array2<f64>,
    single_to_word: Array2<f64>,
    diphone_to_word: Array2<f64>,
    word_bias: Array1<f64>,
    wired: Option<WiredWeights>,
    trained_epochs: usize,
    categories: Vec<Categories>,
}

impl WeightGenerator {
    pub fn new(lexicon: Lexicon, config: ModelConfig) -> Result<Self> {
        config.validate(&lexicon)?;

        let p = lexicon.phoneme_count();
        let d = lexicon.diphone_count();
        let w = lexicon.word_count();

        let mut single_pattern = Array2::zeros((w, p));
        let mut diphone_pattern = Array2::zeros((w, d));
        for (idx, word) in lexicon.words().iter().enumerate() {
            for &phoneme in &word.phonemes {
                single_pattern[[idx, phoneme]] = 1.0;
            }
            for diphone in feature_diphones(&lexicon, &word.phonemes) {
                diphone_pattern[[idx, diphone]] = 1.0;
            }
        }
        log::debug!(
            "Training patterns: single phone {}x{}, diphone {}x{}, word {}x{}",
            w, p, w, d, w, w
        );

        let categories = category_index(&lexicon, CategoryMode::default());
        Ok(Self {
            single_pattern,
            diphone_pattern,
            single_to_word: Array2::zeros((p, w)),
            diphone_to_word: Array2::zeros((d, w)),
            word_bias: Array1::zeros(w),
            wired: None,
            trained_epochs: 0,
            categories,
            lexicon,
            config,
        })
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn trained_epochs(&self) -> usize {
        self.trained_epochs
    }

    pub fn is_wired(&self) -> bool {
        self.wired.is_some()
    }

    pub fn single_to_word(&self) -> &Array2<f64> {
        &self.single_to_word
    }

    pub fn diphone_to_word(&self) -> &Array2<f64> {
        &self.diphone_to_word
    }

    /// Current association output for every word pattern (W × W)
    pub fn outputs(&self) -> Array2<f64> {
        (self.single_pattern.dot(&self.single_to_word) + self.diphone_pattern.dot(&self.diphone_to_word))
            .mapv(|x| x.clamp(0.0, 1.0))
    }

    /// Run `training.epochs` epochs; the epoch counter accumulates across calls
    pub fn train(&mut self, training: &TrainingConfig) -> Vec<EpochStats> {
        let w = self.lexicon.word_count();
        let target = Array2::<f64>::eye(w);
        let lr = training.learning_rate;
        let mut history = Vec::with_capacity(training.epochs);

        for step in 0..training.epochs {
            let output = self.outputs();
            let error = &target - &output;

            let single_update = self.single_pattern.t().dot(&error) * lr;
            let diphone_update = self.diphone_pattern.t().dot(&error) * lr;
            self.single_to_word += &single_update.mapv(|x| x.max(0.0));
            self.diphone_to_word += &diphone_update.mapv(|x| x.max(0.0));

            let stats = epoch_stats(self.trained_epochs + step, &output, &error);
            log::debug!(
                "Epoch {} MSE: {:.6} Target Min: {:.6} NonT Max: {:.6}",
                stats.epoch,
                stats.mse,
                stats.target_min,
                stats.non_target_max
            );
            history.push(stats);
        }

        self.trained_epochs += training.epochs;
        history
    }

    /// Build the fixed matrices the association training does not touch
    pub fn generate_wired_weights(&mut self) {
        log::debug!("Generating wired weights");
        let slots = self.config.time_slots;
        let w = &self.config.weights;
        let (word_to_diphone, word_to_single) = weights::feedback(&self.lexicon, &self.config.feedback);

        self.wired = Some(WiredWeights {
            phoneme_to_diphone: weights::phoneme_to_diphone(&self.lexicon, slots, w.phoneme_to_phone),
            phoneme_to_single: weights::phoneme_to_single(&self.lexicon, slots, w.phoneme_to_phone),
            word_to_word: weights::word_to_word(&self.lexicon, w.word_to_word),
            word_to_diphone,
            word_to_single,
        });
        log::debug!("Wired weights generated");
    }

    /// Complete weight set: wired matrices plus the trained associations
    pub fn weights(&self) -> Result<WeightMatrices> {
        let wired = self.wired.as_ref().ok_or(TiskError::NotWired)?;
        Ok(WeightMatrices {
            phoneme_to_diphone: wired.phoneme_to_diphone.clone(),
            phoneme_to_single: wired.phoneme_to_single.clone(),
            diphone_to_word: self.diphone_to_word.clone(),
            single_to_word: self.single_to_word.clone(),
            word_to_word: wired.word_to_word.clone(),
            word_to_diphone: wired.word_to_diphone.clone(),
            word_to_single: wired.word_to_single.clone(),
            word_bias: self.word_bias.clone(),
        })
    }

    /// Package everything a model needs to run
    pub fn to_bundle(&self) -> Result<WeightBundle> {
        let weights = self.weights()?;
        if self.trained_epochs == 0 {
            log::warn!("phone → word weights were never trained; recognition is not meaningful");
        }
        Ok(WeightBundle {
            lexicon: self.lexicon.clone(),
            config: self.config.clone(),
            categories: self.categories.clone(),
            trained_epochs: self.trained_epochs,
            weights,
        })
    }

    /// Write the bundle to `path`
    pub fn extract(&self, path: impl AsRef<Path>) -> Result<()> {
        let bundle = self.to_bundle()?;
        crate::bundle::save_to_file(&bundle, path)
    }
}

/// Diphones a word is trained on: gap-limited pairs under a gapped scheme,
/// every open pair otherwise
fn feature_diphones(lexicon: &Lexicon, phonemes: &[usize]) -> Vec<usize> {
    match lexicon.scheme() {
        DiphoneScheme::Gapped { gap } => lexicon.gapped_diphones(phonemes, gap),
        DiphoneScheme::Full => lexicon.open_diphones(phonemes),
    }
}

fn epoch_stats(epoch: usize, output: &Array2<f64>, error: &Array2<f64>) -> EpochStats {
    let words = output.nrows().max(1) as f64;
    let mse = error
        .rows()
        .into_iter()
        .map(|row| (row.mapv(|e| e * e).sum() / row.len().max(1) as f64).sqrt())
        .sum::<f64>()
        / words;

    let mut target_min = f64::INFINITY;
    let mut non_target_max = 0.0f64;
    for ((i, j), &value) in output.indexed_iter() {
        if i == j {
            target_min = target_min.min(value);
        } else {
            non_target_max = non_target_max.max(value);
        }
    }
    EpochStats {
        epoch,
        mse,
        target_min: if target_min.is_finite() { target_min } else { 0.0 },
        non_target_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> WeightGenerator {
        let lexicon = Lexicon::new(&["pat", "tap"], DiphoneScheme::Gapped { gap: 3 }).unwrap();
        WeightGenerator::new(lexicon, ModelConfig::new(10)).unwrap()
    }

    #[test]
    fn test_patterns() {
        let gen = generator();
        assert_eq!(gen.single_pattern.dim(), (2, 3));
        // gap 3 over three phonemes: pa pt at, ta tp ap
        assert_eq!(gen.diphone_pattern.dim(), (2, 6));
        assert_eq!(gen.single_pattern.sum(), 6.0);
        assert_eq!(gen.diphone_pattern.row(0).sum(), 3.0);
        assert_eq!(gen.diphone_pattern.row(1).sum(), 3.0);
        assert_eq!(gen.diphone_pattern.row(0).dot(&gen.diphone_pattern.row(1)), 0.0);
    }

    #[test]
    fn test_gap_limits_diphone_features() {
        let lexicon = Lexicon::new(&["pats"], DiphoneScheme::Gapped { gap: 2 }).unwrap();
        let gen = WeightGenerator::new(lexicon, ModelConfig::new(4)).unwrap();
        // adjacent only: pa at ts
        assert_eq!(gen.diphone_pattern.dim(), (1, 3));
        assert_eq!(gen.diphone_pattern.sum(), 3.0);
    }

    #[test]
    fn test_training_monotonic_and_non_negative() {
        let mut gen = generator();
        let history = gen.train(&TrainingConfig::default());
        assert_eq!(history.len(), 1000);
        assert_eq!(gen.trained_epochs(), 1000);

        for pair in history.windows(2) {
            assert!(pair[1].target_min >= pair[0].target_min);
        }
        assert!(gen.single_to_word().iter().all(|&w| w >= 0.0));
        assert!(gen.diphone_to_word().iter().all(|&w| w >= 0.0));

        let out = gen.outputs();
        assert!(out[[0, 0]] > 0.99);
        assert!(out[[1, 1]] > 0.99);
        assert!(out[[0, 1]] < 0.5);
        // diphones are never shared between pat and tap
        let tap_diphone = gen.lexicon().diphone_index("t", "a").unwrap();
        assert_eq!(gen.diphone_to_word()[[tap_diphone, 0]], 0.0);
        assert!(gen.diphone_to_word()[[tap_diphone, 1]] > 0.0);
    }

    #[test]
    fn test_epochs_accumulate() {
        let mut gen = generator();
        let short = TrainingConfig {
            epochs: 5,
            ..TrainingConfig::default()
        };
        gen.train(&short);
        let second = gen.train(&short);
        assert_eq!(gen.trained_epochs(), 10);
        assert_eq!(second.len(), 5);
        assert_eq!(second[0].epoch, 5);
    }

    #[test]
    fn test_extract_requires_wiring() {
        let mut gen = generator();
        assert!(matches!(gen.weights(), Err(TiskError::NotWired)));
        assert!(matches!(gen.to_bundle(), Err(TiskError::NotWired)));

        gen.generate_wired_weights();
        assert!(gen.is_wired());
        let weights = gen.weights().unwrap();
        assert!(weights.validate_shapes(gen.lexicon(), 10).is_ok());
        // untrained: warns, still exports
        let bundle = gen.to_bundle().unwrap();
        assert_eq!(bundle.trained_epochs, 0);
        assert_eq!(bundle.categories.len(), 2);
    }

    #[test]
    fn test_wired_matrices_follow_config() {
        let mut gen = generator();
        gen.generate_wired_weights();
        let weights = gen.weights().unwrap();
        let lex = gen.lexicon();
        let config = gen.config();
        assert_eq!(
            weights.phoneme_to_single,
            weights::phoneme_to_single(lex, config.time_slots, config.weights.phoneme_to_phone)
        );
        for i in 0..2 {
            assert_eq!(weights.word_to_word[[i, i]], 0.0);
        }
        assert!(weights.word_to_diphone.iter().all(|&w| w == 0.0));
    }
}
