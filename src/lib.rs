//! # TISK - Time-Invariant String Kernel
//!
//! An interactive-activation model of spoken-word recognition. Phonemes are
//! presented one time slot at a time; diphone and single-phone units pool the
//! time-slotted phoneme layer into position-independent evidence, and word
//! units compete over it.
//!
//! ## Layers
//!
//! - **Phoneme**: one unit per (slot, phoneme), driven by the input pattern
//! - **Diphone**: ordered phoneme pairs, gated as phonemes are heard
//! - **Single phone**: one unit per phoneme, slot-invariant
//! - **Word**: one unit per lexicon entry, with lateral inhibition
//!
//! ## Workflow
//!
//! 1. Build a [`Lexicon`] (or [`Lexicon::load`] a word list)
//! 2. Pick a [`ModelConfig`] and wire a [`TiskModel`], or train weights with
//!    a [`WeightGenerator`] and restore them from a bundle
//! 3. Simulate with [`TiskModel::simulate`] / [`TiskModel::run_list`]
//! 4. Measure reaction times and category curves, export TSV tables
//!
//! ## Example
//!
//! ```ignore
//! use tisk::{DiphoneScheme, Lexicon, ModelConfig, RtCriteria, TiskModel};
//!
//! let lexicon = Lexicon::new(&["pat", "tap"], DiphoneScheme::Full)?;
//! let model = TiskModel::wired(lexicon, ModelConfig::new(10))?;
//! let trajectories = model.simulate("pat")?;
//! let rt = model.reaction_times("pat", &trajectories, &RtCriteria::default())?;
//! ```

// Error types
mod error;
pub use error::{Result, TiskError};

// Inventories and tokenization
pub mod lexicon;
pub use lexicon::{
    Diphone, DiphoneInventory, DiphoneScheme, Lexicon, PhonemeInventory, Word,
    tokenize,
};

// Parameters
pub mod params;
pub use params::{Decay, Feedback, ModelConfig, Weights};

// Network construction and input encoding
pub mod weights;
pub use weights::WeightMatrices;

pub mod pattern;
pub use pattern::{ActivationRatios, Pronunciation};

// Activation engine - cyclic update loop, gates, batches
pub mod engine;
pub use engine::{Engine, GateArena, Simulation, Trajectories};

// Reaction times and lexical categories
pub mod measure;
pub use measure::{
    Categories, Category, CategoryCounts, CategoryMode, CriterionSummary,
    ReactionTimes, RtCriteria, RtSummary, classify,
};

// Trained weights and their binary bundle
pub mod training;
pub use training::{EpochStats, TrainingConfig, WeightGenerator};

pub mod bundle;
pub use bundle::{load_from_file, save_to_file, WeightBundle};

// Model facade
pub mod model;
pub use model::{RunListOptions, TiskModel, Unit};

// Run-list results and TSV export
pub mod report;
pub use report::{ItemResult, RunListReport};
