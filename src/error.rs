//! Error types for tisk

use thiserror::Error;

/// Tisk error type
#[derive(Debug, Error)]
pub enum TiskError {
    /// Invalid model configuration (slot count, decay range, step count)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Simulation or extraction requested before the weights were wired
    #[error("Weights are not wired: call wire() or generate_wired_weights() first")]
    NotWired,

    /// Phoneme symbol not present in the inventory
    #[error("Unknown phoneme: {0:?}")]
    UnknownPhoneme(String),

    /// Diphone not present in the inventory
    #[error("Unknown diphone: {0:?}")]
    UnknownDiphone(String),

    /// Word not present in the lexicon
    #[error("Unknown word: {0:?}")]
    UnknownWord(String),

    /// Slot index outside the pronunciation or time-slot range
    #[error("Slot {slot} out of range (limit {limit})")]
    SlotOutOfRange { slot: usize, limit: usize },

    /// Activation ratio override does not match the slot's alternatives
    #[error("Activation ratio for slot {slot}: expected {expected} values, got {actual}")]
    RatioMismatch {
        slot: usize,
        expected: usize,
        actual: usize,
    },

    /// Shape mismatch
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary format error
    #[error("Binary format error: {0}")]
    BinaryFormat(String),

    /// Metadata (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TiskError>;
