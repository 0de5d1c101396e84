//! Model parameters
//!
//! Parameters are grouped into typed records ([`Decay`], [`Weights`],
//! [`Feedback`]) held by an immutable [`ModelConfig`]. Changing a parameter
//! produces a new config value; a model must be re-wired to pick it up.

use crate::error::{Result, TiskError};
use crate::lexicon::Lexicon;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default sub-steps per time slot
pub const DEFAULT_STEPS_PER_SLOT: usize = 10;

/// Per-layer activation decay, each in [0, 1)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decay {
    pub phoneme: f64,
    pub diphone: f64,
    pub single_phone: f64,
    pub word: f64,
}

impl Default for Decay {
    fn default() -> Self {
        Self {
            phoneme: 0.001,
            diphone: 0.001,
            single_phone: 0.001,
            word: 0.01,
        }
    }
}

impl Decay {
    fn validate(&self) -> Result<()> {
        let layers = [
            ("phoneme", self.phoneme),
            ("diphone", self.diphone),
            ("single_phone", self.single_phone),
            ("word", self.word),
        ];
        for (name, value) in layers {
            if !(0.0..1.0).contains(&value) {
                return Err(TiskError::Config(format!(
                    "{} decay {} outside [0, 1)",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Feedforward and lateral connection scales
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub input_to_phoneme: f64,
    /// Phoneme → diphone and phoneme → single-phone scale
    pub phoneme_to_phone: f64,
    pub diphone_to_word: f64,
    pub single_phone_to_word: f64,
    /// Lateral word inhibition per shared feature (negative inhibits)
    pub word_to_word: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            input_to_phoneme: 1.0,
            phoneme_to_phone: 0.1,
            diphone_to_word: 0.05,
            single_phone_to_word: 0.01,
            word_to_word: -0.005,
        }
    }
}

/// Top-down word → sublexical feedback
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Word → member diphone
    pub word_to_diphone_activation: f64,
    /// Word → member single phone
    pub word_to_single_phone_activation: f64,
    /// Word → non-member diphone
    pub word_to_diphone_inhibition: f64,
    /// Word → non-member single phone
    pub word_to_single_phone_inhibition: f64,
}

impl Feedback {
    /// Any feedback connection non-zero
    pub fn is_active(&self) -> bool {
        self.word_to_diphone_activation != 0.0
            || self.word_to_single_phone_activation != 0.0
            || self.word_to_diphone_inhibition != 0.0
            || self.word_to_single_phone_inhibition != 0.0
    }
}

/// Complete simulation configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Input time slots (T)
    pub time_slots: usize,
    /// Sub-steps simulated per slot (iStep)
    pub steps_per_slot: usize,
    /// nPhone threshold; `None` uses `(I·(T-1)+1) / (I·T)`
    pub threshold: Option<f64>,
    pub decay: Decay,
    pub weights: Weights,
    pub feedback: Feedback,
}

impl ModelConfig {
    /// Default parameters over `time_slots` slots
    pub fn new(time_slots: usize) -> Self {
        Self {
            time_slots,
            steps_per_slot: DEFAULT_STEPS_PER_SLOT,
            threshold: None,
            decay: Decay::default(),
            weights: Weights::default(),
            feedback: Feedback::default(),
        }
    }

    /// Default parameters with one slot per phoneme of the longest word
    pub fn for_lexicon(lexicon: &Lexicon) -> Self {
        Self::new(lexicon.max_word_len())
    }

    pub fn with_time_slots(self, time_slots: usize) -> Self {
        Self { time_slots, ..self }
    }

    pub fn with_steps_per_slot(self, steps_per_slot: usize) -> Self {
        Self {
            steps_per_slot,
            ..self
        }
    }

    pub fn with_threshold(self, threshold: f64) -> Self {
        Self {
            threshold: Some(threshold),
            ..self
        }
    }

    pub fn with_decay(self, decay: Decay) -> Self {
        Self { decay, ..self }
    }

    pub fn with_weights(self, weights: Weights) -> Self {
        Self { weights, ..self }
    }

    pub fn with_feedback(self, feedback: Feedback) -> Self {
        Self { feedback, ..self }
    }

    /// Effective nPhone threshold
    pub fn threshold(&self) -> f64 {
        self.threshold.unwrap_or_else(|| {
            let steps = self.steps_per_slot as f64;
            let slots = self.time_slots as f64;
            (steps * (slots - 1.0) + 1.0) / (steps * slots)
        })
    }

    /// Recorded cycles per run (T × I)
    pub fn total_cycles(&self) -> usize {
        self.time_slots * self.steps_per_slot
    }

    /// Whether maximal phoneme drive can reach the threshold at all.
    /// Binarization fires at equality, so equal counts as reachable.
    pub fn can_binarize(&self) -> bool {
        self.weights.phoneme_to_phone * self.time_slots as f64 >= self.threshold()
    }

    /// Check the config against a lexicon.
    ///
    /// Hard errors: zero slots or steps, fewer slots than the longest word,
    /// decay outside [0, 1). An unreachable threshold only warns.
    pub fn validate(&self, lexicon: &Lexicon) -> Result<()> {
        if self.time_slots == 0 || self.steps_per_slot == 0 {
            return Err(TiskError::Config(format!(
                "time_slots ({}) and steps_per_slot ({}) must be positive",
                self.time_slots, self.steps_per_slot
            )));
        }
        let longest = lexicon.max_word_len();
        if self.time_slots < longest {
            return Err(TiskError::Config(format!(
                "{} time slots is fewer than the longest word ({} phonemes)",
                self.time_slots, longest
            )));
        }
        self.decay.validate()?;

        if !self.can_binarize() {
            log::warn!(
                "phoneme_to_phone × time_slots ({:.4}) is below threshold {:.4}; \
                 diphone and single-phone units can never activate",
                self.weights.phoneme_to_phone * self.time_slots as f64,
                self.threshold()
            );
        }
        Ok(())
    }
}

impl fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "time_slots: {}", self.time_slots)?;
        writeln!(f, "steps_per_slot: {}", self.steps_per_slot)?;
        writeln!(f, "threshold: {}", self.threshold())?;
        writeln!(f, "decay_phoneme: {}", self.decay.phoneme)?;
        writeln!(f, "decay_diphone: {}", self.decay.diphone)?;
        writeln!(f, "decay_single_phone: {}", self.decay.single_phone)?;
        writeln!(f, "decay_word: {}", self.decay.word)?;
        writeln!(f, "weight_input_to_phoneme: {}", self.weights.input_to_phoneme)?;
        writeln!(f, "weight_phoneme_to_phone: {}", self.weights.phoneme_to_phone)?;
        writeln!(f, "weight_diphone_to_word: {}", self.weights.diphone_to_word)?;
        writeln!(f, "weight_single_phone_to_word: {}", self.weights.single_phone_to_word)?;
        writeln!(f, "weight_word_to_word: {}", self.weights.word_to_word)?;
        writeln!(
            f,
            "feedback_word_to_diphone_activation: {}",
            self.feedback.word_to_diphone_activation
        )?;
        writeln!(
            f,
            "feedback_word_to_single_phone_activation: {}",
            self.feedback.word_to_single_phone_activation
        )?;
        writeln!(
            f,
            "feedback_word_to_diphone_inhibition: {}",
            self.feedback.word_to_diphone_inhibition
        )?;
        write!(
            f,
            "feedback_word_to_single_phone_inhibition: {}",
            self.feedback.word_to_single_phone_inhibition
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::DiphoneScheme;

    #[test]
    fn test_default_threshold() {
        let config = ModelConfig::new(10);
        assert!((config.threshold() - 0.91).abs() < 1e-12);
        assert_eq!(config.total_cycles(), 100);
        assert!(config.can_binarize());

        let explicit = config.clone().with_threshold(0.5);
        assert_eq!(explicit.threshold(), 0.5);
        // source config keeps its derived threshold
        assert!(config.threshold.is_none());
    }

    #[test]
    fn test_unreachable_threshold() {
        // 0.1 × 3 = 0.3 never reaches (10·2+1)/30 = 0.7
        let config = ModelConfig::new(3);
        assert!(!config.can_binarize());
        let lex = Lexicon::new(&["pat", "tap"], DiphoneScheme::Full).unwrap();
        assert!(config.validate(&lex).is_ok());
    }

    #[test]
    fn test_threshold_at_max_drive_is_reachable() {
        // 0.1 × 10 = 1.0 exactly
        let config = ModelConfig::new(10).with_threshold(1.0);
        assert!(config.can_binarize());
        assert!(!ModelConfig::new(10).with_threshold(1.01).can_binarize());
    }

    #[test]
    fn test_slots_shorter_than_word() {
        let lex = Lexicon::new(&["pat", "taps"], DiphoneScheme::Full).unwrap();
        let config = ModelConfig::for_lexicon(&lex);
        assert_eq!(config.time_slots, 4);
        assert!(config.validate(&lex).is_ok());
        assert!(matches!(
            config.with_time_slots(3).validate(&lex),
            Err(TiskError::Config(_))
        ));
    }

    #[test]
    fn test_decay_range() {
        let lex = Lexicon::new(&["pat"], DiphoneScheme::Full).unwrap();
        let decay = Decay {
            word: 1.0,
            ..Decay::default()
        };
        assert!(ModelConfig::new(3).with_decay(decay).validate(&lex).is_err());
        assert!(ModelConfig::new(3)
            .with_steps_per_slot(0)
            .validate(&lex)
            .is_err());
    }

    #[test]
    fn test_feedback_active() {
        assert!(!Feedback::default().is_active());
        let fb = Feedback {
            word_to_single_phone_inhibition: -0.01,
            ..Feedback::default()
        };
        assert!(fb.is_active());
    }

    #[test]
    fn test_display() {
        let text = ModelConfig::new(10).to_string();
        assert!(text.contains("threshold: 0.91"));
        assert!(text.contains("decay_word: 0.01"));
        assert_eq!(text.lines().count(), 16);
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = ModelConfig::new(7).with_threshold(0.8);
        let json = serde_json::to_string(&config).unwrap();
        let back: ModelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
