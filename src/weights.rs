//! Weight matrix construction
//!
//! All connection matrices are derived deterministically from the lexicon
//! and a [`ModelConfig`]. Rows are the sending layer, columns the receiving
//! layer, so a layer's drive is `activation · matrix`.
//!
//! | Matrix                 | Shape      |
//! |------------------------|------------|
//! | phoneme → diphone      | T·P × D    |
//! | phoneme → single phone | T·P × P    |
//! | diphone → word         | D × W      |
//! | single phone → word    | P × W      |
//! | word → word            | W × W      |
//! | word → diphone         | W × D      |
//! | word → single phone    | W × P      |
//! | word bias              | W          |

use crate::error::{Result, TiskError};
use crate::lexicon::{word_features, Lexicon};
use crate::params::{Feedback, ModelConfig};
use ndarray::{Array1, Array2};

/// The complete static parameter set of a wired network
#[derive(Clone, Debug, PartialEq)]
pub struct WeightMatrices {
    pub phoneme_to_diphone: Array2<f64>,
    pub phoneme_to_single: Array2<f64>,
    pub diphone_to_word: Array2<f64>,
    pub single_to_word: Array2<f64>,
    pub word_to_word: Array2<f64>,
    pub word_to_diphone: Array2<f64>,
    pub word_to_single: Array2<f64>,
    pub word_bias: Array1<f64>,
}

impl WeightMatrices {
    /// Hand-wired network: every matrix derived from the lexicon
    pub fn build(lexicon: &Lexicon, config: &ModelConfig) -> Self {
        let slots = config.time_slots;
        let w = &config.weights;
        let (word_to_diphone, word_to_single) = feedback(lexicon, &config.feedback);

        Self {
            phoneme_to_diphone: phoneme_to_diphone(lexicon, slots, w.phoneme_to_phone),
            phoneme_to_single: phoneme_to_single(lexicon, slots, w.phoneme_to_phone),
            diphone_to_word: diphone_to_word(lexicon, w.diphone_to_word),
            single_to_word: single_to_word(lexicon, w.single_phone_to_word),
            word_to_word: word_to_word(lexicon, w.word_to_word),
            word_to_diphone,
            word_to_single,
            word_bias: Array1::zeros(lexicon.word_count()),
        }
    }

    /// Check every matrix against the inventory sizes
    pub fn validate_shapes(&self, lexicon: &Lexicon, time_slots: usize) -> Result<()> {
        let p = lexicon.phoneme_count();
        let d = lexicon.diphone_count();
        let w = lexicon.word_count();
        let tp = time_slots * p;

        let checks: [(&Array2<f64>, [usize; 2]); 7] = [
            (&self.phoneme_to_diphone, [tp, d]),
            (&self.phoneme_to_single, [tp, p]),
            (&self.diphone_to_word, [d, w]),
            (&self.single_to_word, [p, w]),
            (&self.word_to_word, [w, w]),
            (&self.word_to_diphone, [w, d]),
            (&self.word_to_single, [w, p]),
        ];
        for (matrix, expected) in checks {
            if matrix.shape() != &expected[..] {
                return Err(TiskError::ShapeMismatch {
                    expected: expected.to_vec(),
                    actual: matrix.shape().to_vec(),
                });
            }
        }
        if self.word_bias.len() != w {
            return Err(TiskError::ShapeMismatch {
                expected: vec![w],
                actual: vec![self.word_bias.len()],
            });
        }
        Ok(())
    }
}

/// Phoneme (at slot) → diphone.
///
/// Phoneme `a` at slot `s` feeds diphone `(a, b)` with `w·(T-1-s)` and
/// phoneme `b` at slot `s` feeds it with `w·s`. A self pair `(a, a)`
/// receives both contributions.
pub fn phoneme_to_diphone(lexicon: &Lexicon, time_slots: usize, weight: f64) -> Array2<f64> {
    let p = lexicon.phoneme_count();
    let mut matrix = Array2::zeros((time_slots * p, lexicon.diphone_count()));

    for slot in 0..time_slots {
        let as_first = weight * (time_slots - 1 - slot) as f64;
        let as_second = weight * slot as f64;
        for (d, pair) in lexicon.diphones().pairs().iter().enumerate() {
            matrix[[slot * p + pair.first, d]] += as_first;
            matrix[[slot * p + pair.second, d]] += as_second;
        }
    }
    matrix
}

/// Phoneme (at slot) → single phone: `w·T` on the phoneme's own unit, for
/// every slot
pub fn phoneme_to_single(lexicon: &Lexicon, time_slots: usize, weight: f64) -> Array2<f64> {
    let p = lexicon.phoneme_count();
    let mut matrix = Array2::zeros((time_slots * p, p));
    let value = weight * time_slots as f64;
    for slot in 0..time_slots {
        for phoneme in 0..p {
            matrix[[slot * p + phoneme, phoneme]] = value;
        }
    }
    matrix
}

/// Diphone → word: `w / len(word)` for each of the word's open diphones
pub fn diphone_to_word(lexicon: &Lexicon, weight: f64) -> Array2<f64> {
    let mut matrix = Array2::zeros((lexicon.diphone_count(), lexicon.word_count()));
    for (w, word) in lexicon.words().iter().enumerate() {
        let value = weight / word.len() as f64;
        for d in lexicon.open_diphones(&word.phonemes) {
            matrix[[d, w]] = value;
        }
    }
    matrix
}

/// Single phone → word: `w` for each phoneme occurring in the word
pub fn single_to_word(lexicon: &Lexicon, weight: f64) -> Array2<f64> {
    let mut matrix = Array2::zeros((lexicon.phoneme_count(), lexicon.word_count()));
    for (w, word) in lexicon.words().iter().enumerate() {
        for &p in &word.phonemes {
            matrix[[p, w]] = weight;
        }
    }
    matrix
}

/// Word → word lateral inhibition: shared phonemes and adjacent bigrams
/// times `weight`, zero diagonal. Left all-zero when `weight == 0`.
pub fn word_to_word(lexicon: &Lexicon, weight: f64) -> Array2<f64> {
    let n = lexicon.word_count();
    let mut matrix = Array2::zeros((n, n));
    if weight == 0.0 {
        return matrix;
    }

    let features: Vec<_> = lexicon
        .words()
        .iter()
        .map(|word| word_features(&word.phonemes))
        .collect();
    for i in 0..n {
        for j in (i + 1)..n {
            let shared = features[i].intersection(&features[j]).count() as f64 * weight;
            matrix[[i, j]] = shared;
            matrix[[j, i]] = shared;
        }
    }
    matrix
}

/// Word → diphone and word → single-phone feedback.
///
/// Member units get the activation value, all others the inhibition value.
/// Both matrices stay zero when no feedback parameter is set.
pub fn feedback(lexicon: &Lexicon, feedback: &Feedback) -> (Array2<f64>, Array2<f64>) {
    let w = lexicon.word_count();
    let mut to_diphone = Array2::zeros((w, lexicon.diphone_count()));
    let mut to_single = Array2::zeros((w, lexicon.phoneme_count()));
    if !feedback.is_active() {
        return (to_diphone, to_single);
    }

    to_diphone.fill(feedback.word_to_diphone_inhibition);
    to_single.fill(feedback.word_to_single_phone_inhibition);
    for (idx, word) in lexicon.words().iter().enumerate() {
        for d in lexicon.open_diphones(&word.phonemes) {
            to_diphone[[idx, d]] = feedback.word_to_diphone_activation;
        }
        for &p in &word.phonemes {
            to_single[[idx, p]] = feedback.word_to_single_phone_activation;
        }
    }
    (to_diphone, to_single)
}
