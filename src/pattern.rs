//! Input pattern encoding
//!
//! A [`Pronunciation`] is a sequence of slots, each holding one phoneme or
//! several alternatives (an ambiguous input). [`encode`] lays it out over the
//! time-slotted phoneme layer: slot `s` occupies indices `s·P .. (s+1)·P`.

use crate::error::{Result, TiskError};
use crate::lexicon::{join_symbols, Lexicon};
use ndarray::Array1;
use std::collections::HashMap;

/// Per-slot activation overrides: slot → one value per alternative, in the
/// order the alternatives were given
pub type ActivationRatios = HashMap<usize, Vec<f64>>;

/// Phoneme input presented to the model
#[derive(Clone, Debug, PartialEq)]
pub struct Pronunciation {
    label: String,
    slots: Vec<Vec<usize>>,
}

impl Pronunciation {
    /// Unambiguous input from phoneme indices
    pub fn from_phonemes(label: impl Into<String>, phonemes: &[usize]) -> Self {
        Self {
            label: label.into(),
            slots: phonemes.iter().map(|&p| vec![p]).collect(),
        }
    }

    /// Unambiguous input from a pronunciation string
    pub fn parse(lexicon: &Lexicon, text: &str) -> Result<Self> {
        let phonemes = lexicon.encode(text)?;
        Ok(Self::from_phonemes(text.trim(), &phonemes))
    }

    /// Input of a lexicon word
    pub fn word(lexicon: &Lexicon, idx: usize) -> Self {
        let word = lexicon.word(idx);
        Self::from_phonemes(word.label.clone(), &word.phonemes)
    }

    /// Input with alternatives per slot, e.g. `[["p", "b"], ["a"], ["t"]]`
    pub fn ambiguous<S: AsRef<str>>(lexicon: &Lexicon, slots: &[Vec<S>]) -> Result<Self> {
        let mut resolved = Vec::with_capacity(slots.len());
        let mut label_parts = Vec::with_capacity(slots.len());
        for (slot, alternatives) in slots.iter().enumerate() {
            if alternatives.is_empty() {
                return Err(TiskError::Config(format!("slot {} has no phonemes", slot)));
            }
            let mut indices: Vec<usize> = Vec::with_capacity(alternatives.len());
            for symbol in alternatives {
                let idx = lexicon.phonemes().lookup(symbol.as_ref())?;
                if !indices.contains(&idx) {
                    indices.push(idx);
                }
            }
            let symbols: Vec<&str> = indices.iter().map(|&i| lexicon.phonemes().symbol(i)).collect();
            label_parts.push(if symbols.len() == 1 {
                symbols[0].to_string()
            } else {
                format!("[{}]", symbols.join("|"))
            });
            resolved.push(indices);
        }
        Ok(Self {
            label: join_symbols(&label_parts),
            slots: resolved,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Vec<usize>] {
        &self.slots
    }

    /// Phoneme presented at `slot` when it is unambiguous
    pub fn phoneme_at(&self, slot: usize) -> Option<usize> {
        match self.slots.get(slot).map(Vec::as_slice) {
            Some([only]) => Some(*only),
            _ => None,
        }
    }

    /// Phoneme sequence when no slot is ambiguous
    pub fn phonemes(&self) -> Option<Vec<usize>> {
        (0..self.len()).map(|s| self.phoneme_at(s)).collect()
    }
}

/// Encode a pronunciation as a `time_slots · phoneme_count` input vector.
///
/// Each alternative in a slot gets `1 / alternatives` unless `ratios`
/// supplies explicit values for that slot.
pub fn encode(
    pronunciation: &Pronunciation,
    phoneme_count: usize,
    time_slots: usize,
    ratios: &ActivationRatios,
) -> Result<Array1<f64>> {
    if pronunciation.len() > time_slots {
        return Err(TiskError::SlotOutOfRange {
            slot: pronunciation.len() - 1,
            limit: time_slots,
        });
    }
    if let Some(&slot) = ratios.keys().find(|&&s| s >= pronunciation.len()) {
        return Err(TiskError::SlotOutOfRange {
            slot,
            limit: pronunciation.len(),
        });
    }

    let mut pattern = Array1::zeros(phoneme_count * time_slots);
    for (slot, alternatives) in pronunciation.slots().iter().enumerate() {
        let offset = slot * phoneme_count;
        match ratios.get(&slot) {
            Some(values) => {
                if values.len() != alternatives.len() {
                    return Err(TiskError::RatioMismatch {
                        slot,
                        expected: alternatives.len(),
                        actual: values.len(),
                    });
                }
                for (&phoneme, &value) in alternatives.iter().zip(values) {
                    pattern[offset + phoneme] = value;
                }
            }
            None => {
                let share = 1.0 / alternatives.len() as f64;
                for &phoneme in alternatives {
                    pattern[offset + phoneme] = share;
                }
            }
        }
    }
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::DiphoneScheme;

    fn lexicon() -> Lexicon {
        Lexicon::new(&["pat", "tap", "bat"], DiphoneScheme::Full).unwrap()
    }

    #[test]
    fn test_encode_plain() {
        let lex = lexicon();
        let pron = Pronunciation::parse(&lex, "pat").unwrap();
        let pattern = encode(&pron, lex.phoneme_count(), 4, &ActivationRatios::new()).unwrap();

        assert_eq!(pattern.len(), 16);
        // p@0, a@1, t@2; slot 3 empty
        assert_eq!(pattern[0], 1.0);
        assert_eq!(pattern[4 + 1], 1.0);
        assert_eq!(pattern[8 + 2], 1.0);
        assert_eq!(pattern.sum(), 3.0);
    }

    #[test]
    fn test_encode_ambiguous_default_share() {
        let lex = lexicon();
        let pron = Pronunciation::ambiguous(&lex, &[vec!["p", "b"], vec!["a"], vec!["t"]]).unwrap();
        assert_eq!(pron.label(), "[p|b] a t");
        assert_eq!(pron.phoneme_at(0), None);
        assert_eq!(pron.phoneme_at(1), Some(1));
        assert!(pron.phonemes().is_none());

        let pattern = encode(&pron, lex.phoneme_count(), 3, &ActivationRatios::new()).unwrap();
        assert_eq!(pattern[0], 0.5);
        assert_eq!(pattern[3], 0.5);
    }

    #[test]
    fn test_ambiguous_repeated_alternative() {
        let lex = lexicon();
        let pron = Pronunciation::ambiguous(&lex, &[vec!["p", "p"], vec!["a", "b", "a"], vec!["t"]]).unwrap();
        assert_eq!(pron.label(), "p [a|b] t");
        assert_eq!(pron.phoneme_at(0), Some(0));
        assert_eq!(pron.slots()[1].len(), 2);

        let mut ratios = ActivationRatios::new();
        ratios.insert(1, vec![0.5, 0.3, 0.2]);
        assert!(matches!(
            encode(&pron, lex.phoneme_count(), 3, &ratios),
            Err(TiskError::RatioMismatch { slot: 1, expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_encode_ratio_override() {
        let lex = lexicon();
        let pron = Pronunciation::ambiguous(&lex, &[vec!["p", "b"], vec!["a"], vec!["t"]]).unwrap();
        let mut ratios = ActivationRatios::new();
        ratios.insert(0, vec![0.8, 0.2]);
        let pattern = encode(&pron, lex.phoneme_count(), 3, &ratios).unwrap();
        assert_eq!(pattern[0], 0.8);
        assert_eq!(pattern[3], 0.2);

        ratios.insert(0, vec![1.0]);
        assert!(matches!(
            encode(&pron, lex.phoneme_count(), 3, &ratios),
            Err(TiskError::RatioMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_encode_errors() {
        let lex = lexicon();
        assert!(matches!(
            Pronunciation::parse(&lex, "pit"),
            Err(TiskError::UnknownPhoneme(_))
        ));

        let pron = Pronunciation::parse(&lex, "pat").unwrap();
        assert!(matches!(
            encode(&pron, lex.phoneme_count(), 2, &ActivationRatios::new()),
            Err(TiskError::SlotOutOfRange { slot: 2, limit: 2 })
        ));

        let mut ratios = ActivationRatios::new();
        ratios.insert(5, vec![1.0]);
        assert!(matches!(
            encode(&pron, lex.phoneme_count(), 3, &ratios),
            Err(TiskError::SlotOutOfRange { slot: 5, .. })
        ));
    }
}
