//! Activation engine
//!
//! The cyclic update loop over the four layers (phoneme, diphone, single
//! phone, word). Each run walks the `T` time slots; each slot is simulated
//! for `I` sub-steps with the input masked to that slot's region.
//!
//! ## Sub-step order
//!
//! All drives are computed from the previous sub-step's activations, then
//! every layer is integrated:
//!
//! ```text
//! phoneme  ← input[slot] × w_in
//! diphone  ← step(phoneme · (gate ⊙ W_pd)) + word · W_wd
//! single   ← step(phoneme · W_ps)          + word · W_ws
//! word     ← diphone · W_dw + single · W_sw + bias + word · W_ww
//!
//! a' = clip(a·(1 - decay) - |drive|·a + max(drive, 0), 0, 1)
//! ```
//!
//! `step` binarizes: drive at or above the nPhone threshold contributes a
//! fixed 0.1, anything else 0.
//!
//! ## Gates
//!
//! After a slot's sub-steps, the phoneme presented there closes its
//! phoneme → diphone connections, in every *later* slot, for each diphone it
//! leads with a different second phoneme. Gates never reopen within a run.
//!
//! ## Batches
//!
//! A batch shares the slot counter but nothing else: every run owns its
//! activations and a private block of the [`GateArena`]. Runs within a slot
//! are stepped in parallel with rayon; the weights are shared read-only.

use crate::error::{Result, TiskError};
use crate::lexicon::Lexicon;
use crate::params::ModelConfig;
use crate::pattern::{encode, ActivationRatios, Pronunciation};
use crate::weights::WeightMatrices;
use ndarray::{Array1, Array2, ArrayView1, Zip};
use rayon::prelude::*;

/// Drive delivered by a binarized diphone or single-phone unit
pub const BINARY_UNIT_DRIVE: f64 = 0.1;

/// Per-cycle activation record of one run (rows = cycles, columns = units)
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectories {
    pub phoneme: Array2<f64>,
    pub diphone: Array2<f64>,
    pub single_phone: Array2<f64>,
    pub word: Array2<f64>,
}

impl Trajectories {
    fn zeros(cycles: usize, phonemes: usize, diphones: usize, singles: usize, words: usize) -> Self {
        Self {
            phoneme: Array2::zeros((cycles, phonemes)),
            diphone: Array2::zeros((cycles, diphones)),
            single_phone: Array2::zeros((cycles, singles)),
            word: Array2::zeros((cycles, words)),
        }
    }

    /// Number of recorded cycles
    pub fn cycles(&self) -> usize {
        self.word.nrows()
    }

    /// Activation of one word over time
    pub fn word_series(&self, word: usize) -> ArrayView1<'_, f64> {
        self.word.column(word)
    }
}

// ============================================================================
// Gate arena
// ============================================================================

/// Phoneme → diphone gates for a batch of runs.
///
/// One flat `rows × cols` block per run, `rows = T·P`, `cols = D`, all open
/// at creation.
#[derive(Clone, Debug)]
pub struct GateArena {
    runs: usize,
    cols: usize,
    stride: usize,
    open: Vec<bool>,
}

impl GateArena {
    pub fn new(runs: usize, rows: usize, cols: usize) -> Self {
        Self {
            runs,
            cols,
            stride: rows * cols,
            open: vec![true; runs * rows * cols],
        }
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Gate state for `(run, row, col)`
    pub fn is_open(&self, run: usize, row: usize, col: usize) -> bool {
        self.open[run * self.stride + row * self.cols + col]
    }

    /// Gate block of one run
    pub fn run_gates(&self, run: usize) -> &[bool] {
        &self.open[run * self.stride..(run + 1) * self.stride]
    }

    /// Closed cells in one run
    pub fn closed_count(&self, run: usize) -> usize {
        self.run_gates(run).iter().filter(|&&g| !g).count()
    }

    /// Disjoint mutable blocks, one per run
    fn split_runs(&mut self) -> Vec<&mut [bool]> {
        if self.stride == 0 {
            return (0..self.runs).map(|_| Default::default()).collect();
        }
        self.open.chunks_mut(self.stride).collect()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Read-only view of a wired network, ready to simulate
#[derive(Clone, Copy, Debug)]
pub struct Engine<'a> {
    lexicon: &'a Lexicon,
    weights: &'a WeightMatrices,
    config: &'a ModelConfig,
    threshold: f64,
    /// Any non-zero word → sublexical feedback
    feedback: bool,
    /// Any non-zero word → word connection
    lateral: bool,
}

impl<'a> Engine<'a> {
    /// Bind weights to their lexicon and config, checking every shape
    pub fn new(lexicon: &'a Lexicon, weights: &'a WeightMatrices, config: &'a ModelConfig) -> Result<Self> {
        weights.validate_shapes(lexicon, config.time_slots)?;
        let feedback = weights.word_to_diphone.iter().any(|&w| w != 0.0)
            || weights.word_to_single.iter().any(|&w| w != 0.0);
        let lateral = weights.word_to_word.iter().any(|&w| w != 0.0);

        Ok(Self {
            lexicon,
            weights,
            config,
            threshold: config.threshold(),
            feedback,
            lateral,
        })
    }

    /// Simulate one pronunciation with optional activation ratios
    pub fn run(&self, pronunciation: &Pronunciation, ratios: &ActivationRatios) -> Result<Trajectories> {
        let mut results = self.start([(pronunciation, ratios)])?.run_to_end();
        results
            .pop()
            .ok_or_else(|| TiskError::Config("empty simulation batch".to_string()))
    }

    /// Simulate several pronunciations side by side
    pub fn run_batch(&self, pronunciations: &[Pronunciation]) -> Result<Vec<Trajectories>> {
        let none = ActivationRatios::new();
        Ok(self
            .start(pronunciations.iter().map(|p| (p, &none)))?
            .run_to_end())
    }

    /// Encode inputs and set up a batch, positioned before slot 0
    pub fn start<'p, I>(&self, inputs: I) -> Result<Simulation<'a>>
    where
        I: IntoIterator<Item = (&'p Pronunciation, &'p ActivationRatios)>,
    {
        let p = self.lexicon.phoneme_count();
        let d = self.lexicon.diphone_count();
        let w = self.lexicon.word_count();
        let slots = self.config.time_slots;
        let cycles = self.config.total_cycles();

        let states = inputs
            .into_iter()
            .map(|(pronunciation, ratios)| {
                let pattern = encode(pronunciation, p, slots, ratios)?;
                Ok(RunState {
                    pattern,
                    presented: (0..pronunciation.len())
                        .map(|s| pronunciation.phoneme_at(s))
                        .collect(),
                    phoneme: Array1::zeros(slots * p),
                    diphone: Array1::zeros(d),
                    single_phone: Array1::zeros(p),
                    word: Array1::zeros(w),
                    record: Trajectories::zeros(cycles, slots * p, d, p, w),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("Starting simulation batch of {} runs over {} cycles", states.len(), cycles);
        let gates = GateArena::new(states.len(), slots * p, d);
        Ok(Simulation {
            engine: *self,
            states,
            gates,
            slot: 0,
        })
    }
}

/// Binarize a phoneme-driven input against the nPhone threshold
#[inline]
fn binarize(drive: f64, threshold: f64) -> f64 {
    if drive >= threshold {
        BINARY_UNIT_DRIVE
    } else {
        0.0
    }
}

/// Shared update rule: decay, drive-proportional leak, positive drive, clip
fn integrate(activation: &mut Array1<f64>, drive: &Array1<f64>, decay: f64) {
    Zip::from(activation).and(drive).for_each(|a, &d| {
        *a = (*a * (1.0 - decay) - d.abs() * *a + d.max(0.0)).clamp(0.0, 1.0);
    });
}

// ============================================================================
// Run state
// ============================================================================

struct RunState {
    pattern: Array1<f64>,
    /// Phoneme presented per slot (None when the slot is ambiguous)
    presented: Vec<Option<usize>>,
    phoneme: Array1<f64>,
    diphone: Array1<f64>,
    single_phone: Array1<f64>,
    word: Array1<f64>,
    record: Trajectories,
}

impl RunState {
    fn advance_slot(&mut self, engine: &Engine<'_>, slot: usize, gates: &mut [bool]) {
        let p = engine.lexicon.phoneme_count();
        let w_in = engine.config.weights.input_to_phoneme;
        let steps = engine.config.steps_per_slot;

        // Location mask is fixed for the whole slot
        let region = slot * p..(slot + 1) * p;
        let input: Array1<f64> = self
            .pattern
            .iter()
            .enumerate()
            .map(|(i, &v)| if region.contains(&i) { v * w_in } else { 0.0 })
            .collect();

        for step in 0..steps {
            self.substep(engine, &input, gates, slot * steps + step);
        }
        self.close_gates(engine, slot, gates);
    }

    fn substep(&mut self, engine: &Engine<'_>, input: &Array1<f64>, gates: &[bool], cycle: usize) {
        let weights = engine.weights;
        let decay = &engine.config.decay;
        let threshold = engine.threshold;
        let d_count = weights.phoneme_to_diphone.ncols();

        // Diphone: gated phoneme drive, binarized, plus feedback
        let mut diphone_drive = Array1::<f64>::zeros(d_count);
        for (row, &act) in self.phoneme.iter().enumerate() {
            if act == 0.0 {
                continue;
            }
            let gate_row = &gates[row * d_count..(row + 1) * d_count];
            for ((drive, &weight), &open) in diphone_drive
                .iter_mut()
                .zip(weights.phoneme_to_diphone.row(row))
                .zip(gate_row)
            {
                if open {
                    *drive += act * weight;
                }
            }
        }
        diphone_drive.mapv_inplace(|x| binarize(x, threshold));

        // Single phone: same transform, no gate
        let mut single_drive = self.phoneme.dot(&weights.phoneme_to_single);
        single_drive.mapv_inplace(|x| binarize(x, threshold));

        if engine.feedback {
            diphone_drive += &self.word.dot(&weights.word_to_diphone);
            single_drive += &self.word.dot(&weights.word_to_single);
        }

        let mut word_drive = self.diphone.dot(&weights.diphone_to_word)
            + &self.single_phone.dot(&weights.single_to_word)
            + &weights.word_bias;
        if engine.lateral {
            word_drive += &self.word.dot(&weights.word_to_word);
        }

        integrate(&mut self.phoneme, input, decay.phoneme);
        integrate(&mut self.diphone, &diphone_drive, decay.diphone);
        integrate(&mut self.single_phone, &single_drive, decay.single_phone);
        integrate(&mut self.word, &word_drive, decay.word);

        self.record.phoneme.row_mut(cycle).assign(&self.phoneme);
        self.record.diphone.row_mut(cycle).assign(&self.diphone);
        self.record.single_phone.row_mut(cycle).assign(&self.single_phone);
        self.record.word.row_mut(cycle).assign(&self.word);
    }

    fn close_gates(&self, engine: &Engine<'_>, slot: usize, gates: &mut [bool]) {
        // No input past the end of the pronunciation, nothing to close for
        // an ambiguous slot
        let Some(&Some(phoneme)) = self.presented.get(slot) else {
            return;
        };
        let p = engine.lexicon.phoneme_count();
        let d_count = engine.lexicon.diphone_count();
        for &d in engine.lexicon.diphones().closing_set(phoneme) {
            for later in (slot + 1)..engine.config.time_slots {
                gates[(later * p + phoneme) * d_count + d] = false;
            }
        }
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// A batch in progress, advanced one time slot at a time
pub struct Simulation<'a> {
    engine: Engine<'a>,
    states: Vec<RunState>,
    gates: GateArena,
    slot: usize,
}

impl<'a> Simulation<'a> {
    /// Next slot to simulate
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn is_finished(&self) -> bool {
        self.slot >= self.engine.config.time_slots
    }

    pub fn gates(&self) -> &GateArena {
        &self.gates
    }

    /// Run all sub-steps of the next slot for every run, then close gates.
    /// Returns false once every slot has been simulated.
    pub fn advance_slot(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        let engine = self.engine;
        let slot = self.slot;
        let blocks = self.gates.split_runs();
        self.states
            .par_iter_mut()
            .zip(blocks.into_par_iter())
            .for_each(|(state, gates)| state.advance_slot(&engine, slot, gates));
        self.slot += 1;
        true
    }

    /// Simulate the remaining slots and hand back every run's record
    pub fn run_to_end(mut self) -> Vec<Trajectories> {
        while self.advance_slot() {}
        self.states.into_iter().map(|s| s.record).collect()
    }
}
