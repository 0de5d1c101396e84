//! Lexicon and feature extraction
//!
//! Derives the three inventories the network is wired from:
//!
//! - **Phonemes**: unique symbols in first-appearance order, plus any
//!   supplementary symbols from a phoneme file
//! - **Diphones**: ordered phoneme pairs, either the full P×P product or only
//!   the pairs that occur within a maximum separation ("gap")
//! - **Words**: pronunciations as dense phoneme-index sequences
//!
//! Every symbol, pair and pronunciation gets a dense integer index once, at
//! construction. Nothing downstream searches by string.

use crate::error::{Result, TiskError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Split a pronunciation string into phoneme tokens.
///
/// A string containing whitespace is split on it, which allows
/// multi-character symbols (`"ch a t"`). Otherwise every character is one
/// phoneme (`"pat"`).
pub fn tokenize(pronunciation: &str) -> Vec<String> {
    let trimmed = pronunciation.trim();
    if trimmed.chars().any(char::is_whitespace) {
        trimmed.split_whitespace().map(str::to_string).collect()
    } else {
        trimmed.chars().map(|c| c.to_string()).collect()
    }
}

/// Join symbols back into a display label.
///
/// Single-character symbols are concatenated, anything longer is space
/// separated so the label tokenizes back to the same sequence.
pub fn join_symbols<S: AsRef<str>>(symbols: &[S]) -> String {
    if symbols.iter().all(|s| s.as_ref().chars().count() == 1) {
        symbols.iter().map(|s| s.as_ref()).collect()
    } else {
        symbols
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================================================================
// Phonemes
// ============================================================================

/// Ordered, deduplicated phoneme inventory
#[derive(Clone, Debug, Default)]
pub struct PhonemeInventory {
    symbols: Vec<String>,
    index: HashMap<String, usize>,
}

impl PhonemeInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from symbols, keeping the first occurrence of each
    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inventory = Self::new();
        for symbol in symbols {
            inventory.insert(symbol.as_ref());
        }
        inventory
    }

    /// Insert a symbol, returning its index (existing or new)
    pub fn insert(&mut self, symbol: &str) -> usize {
        if let Some(&idx) = self.index.get(symbol) {
            return idx;
        }
        let idx = self.symbols.len();
        self.symbols.push(symbol.to_string());
        self.index.insert(symbol.to_string(), idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbol(&self, idx: usize) -> &str {
        &self.symbols[idx]
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn get(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    /// Index of a symbol, or a lookup error
    pub fn lookup(&self, symbol: &str) -> Result<usize> {
        self.get(symbol)
            .ok_or_else(|| TiskError::UnknownPhoneme(symbol.to_string()))
    }
}

// ============================================================================
// Diphones
// ============================================================================

/// Ordered phoneme pair (not necessarily adjacent in a word)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diphone {
    pub first: usize,
    pub second: usize,
}

impl Diphone {
    pub fn new(first: usize, second: usize) -> Self {
        Self { first, second }
    }

    /// Phoneme paired with itself
    pub fn is_self_pair(&self) -> bool {
        self.first == self.second
    }
}

/// How the diphone inventory is derived from the word list
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiphoneScheme {
    /// Every ordered pair of inventory phonemes (P×P)
    #[default]
    Full,
    /// Only pairs occurring in some word with positions `j - i < gap`
    Gapped { gap: usize },
}

/// Deduplicated diphone inventory
#[derive(Clone, Debug)]
pub struct DiphoneInventory {
    pairs: Vec<Diphone>,
    index: HashMap<Diphone, usize>,
    /// Per phoneme: diphones it leads whose second phoneme differs.
    /// These are the gate cells closed once the phoneme has been heard.
    closing: Vec<Vec<usize>>,
}

impl DiphoneInventory {
    /// Full Cartesian product, `first`-major
    pub fn full(phoneme_count: usize) -> Self {
        let pairs = (0..phoneme_count)
            .flat_map(|a| (0..phoneme_count).map(move |b| Diphone::new(a, b)));
        Self::from_pairs(pairs, phoneme_count)
    }

    /// Build from pairs in order, dropping repeats
    pub fn from_pairs<I>(pairs: I, phoneme_count: usize) -> Self
    where
        I: IntoIterator<Item = Diphone>,
    {
        let mut unique = Vec::new();
        let mut index = HashMap::new();
        for pair in pairs {
            if !index.contains_key(&pair) {
                index.insert(pair, unique.len());
                unique.push(pair);
            }
        }

        let mut closing = vec![Vec::new(); phoneme_count];
        for (d, pair) in unique.iter().enumerate() {
            if !pair.is_self_pair() {
                closing[pair.first].push(d);
            }
        }

        Self {
            pairs: unique,
            index,
            closing,
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pair(&self, idx: usize) -> Diphone {
        self.pairs[idx]
    }

    pub fn pairs(&self) -> &[Diphone] {
        &self.pairs
    }

    pub fn get(&self, pair: Diphone) -> Option<usize> {
        self.index.get(&pair).copied()
    }

    /// Diphones led by `phoneme` with a different second phoneme
    pub fn closing_set(&self, phoneme: usize) -> &[usize] {
        &self.closing[phoneme]
    }
}

/// Open diphones of a pronunciation: every pair of positions `i < j`,
/// adjacent or not, repeats collapsed, in first-seen order.
pub fn open_pairs(phonemes: &[usize]) -> Vec<Diphone> {
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for (i, &first) in phonemes.iter().enumerate() {
        for &second in &phonemes[i + 1..] {
            let pair = Diphone::new(first, second);
            if seen.insert(pair) {
                pairs.push(pair);
            }
        }
    }
    pairs
}

/// Pairs of positions `i < j` with `j - i < gap`, repeats collapsed.
pub fn gapped_pairs(phonemes: &[usize], gap: usize) -> Vec<Diphone> {
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for (i, &first) in phonemes.iter().enumerate() {
        for (offset, &second) in phonemes[i + 1..].iter().enumerate() {
            if offset + 1 >= gap {
                break;
            }
            let pair = Diphone::new(first, second);
            if seen.insert(pair) {
                pairs.push(pair);
            }
        }
    }
    pairs
}

// ============================================================================
// Word features
// ============================================================================

/// Sublexical feature shared between words (drives lateral inhibition)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    Phoneme(usize),
    Bigram(usize, usize),
}

/// Phoneme set plus adjacent bigrams of a pronunciation
pub fn word_features(phonemes: &[usize]) -> HashSet<Feature> {
    let mut features: HashSet<Feature> = phonemes.iter().map(|&p| Feature::Phoneme(p)).collect();
    features.extend(phonemes.windows(2).map(|w| Feature::Bigram(w[0], w[1])));
    features
}

// ============================================================================
// Lexicon
// ============================================================================

/// One lexicon entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Word {
    /// Pronunciation as written in the source list
    pub label: String,
    /// Phoneme indices
    pub phonemes: Vec<usize>,
}

impl Word {
    pub fn len(&self) -> usize {
        self.phonemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phonemes.is_empty()
    }
}

/// Word list with its phoneme and diphone inventories
#[derive(Clone, Debug)]
pub struct Lexicon {
    phonemes: PhonemeInventory,
    diphones: DiphoneInventory,
    scheme: DiphoneScheme,
    words: Vec<Word>,
    by_phonemes: HashMap<Vec<usize>, usize>,
    by_label: HashMap<String, usize>,
}

impl Lexicon {
    /// Build from pronunciation strings
    pub fn new<S: AsRef<str>>(words: &[S], scheme: DiphoneScheme) -> Result<Self> {
        Self::with_phonemes(words, &[] as &[&str], scheme)
    }

    /// Build from pronunciation strings, forcing `extra_phonemes` into the
    /// inventory even when no word uses them
    pub fn with_phonemes<S, E>(words: &[S], extra_phonemes: &[E], scheme: DiphoneScheme) -> Result<Self>
    where
        S: AsRef<str>,
        E: AsRef<str>,
    {
        if words.is_empty() {
            return Err(TiskError::Config("word list is empty".to_string()));
        }
        if let DiphoneScheme::Gapped { gap } = scheme {
            if gap < 2 {
                return Err(TiskError::Config(format!(
                    "diphone gap {} admits no pairs; use at least 2",
                    gap
                )));
            }
        }

        let mut phonemes = PhonemeInventory::new();
        let mut entries = Vec::with_capacity(words.len());
        for (line, word) in words.iter().enumerate() {
            let tokens = tokenize(word.as_ref());
            if tokens.is_empty() {
                return Err(TiskError::Config(format!("empty pronunciation at entry {}", line)));
            }
            let indices = tokens.iter().map(|t| phonemes.insert(t)).collect();
            entries.push(Word {
                label: word.as_ref().trim().to_string(),
                phonemes: indices,
            });
        }
        for symbol in extra_phonemes {
            let symbol = symbol.as_ref().trim();
            if !symbol.is_empty() {
                phonemes.insert(symbol);
            }
        }

        let diphones = match scheme {
            DiphoneScheme::Full => DiphoneInventory::full(phonemes.len()),
            DiphoneScheme::Gapped { gap } => DiphoneInventory::from_pairs(
                entries.iter().flat_map(|w| gapped_pairs(&w.phonemes, gap)),
                phonemes.len(),
            ),
        };

        Ok(Self::assemble(phonemes, diphones, scheme, entries))
    }

    /// Rebuild a lexicon with exactly the given inventory order
    /// (used when restoring a saved weight bundle)
    pub fn from_parts(
        phoneme_symbols: &[String],
        diphones: &[Diphone],
        word_labels: &[String],
        scheme: DiphoneScheme,
    ) -> Result<Self> {
        let phonemes = PhonemeInventory::from_symbols(phoneme_symbols);
        if phonemes.len() != phoneme_symbols.len() {
            return Err(TiskError::Config("duplicate phoneme symbols".to_string()));
        }
        let p = phonemes.len();
        if let Some(bad) = diphones.iter().find(|d| d.first >= p || d.second >= p) {
            return Err(TiskError::UnknownDiphone(format!("({}, {})", bad.first, bad.second)));
        }

        let mut entries = Vec::with_capacity(word_labels.len());
        for label in word_labels {
            let indices = tokenize(label)
                .iter()
                .map(|t| phonemes.lookup(t))
                .collect::<Result<Vec<_>>>()?;
            entries.push(Word {
                label: label.clone(),
                phonemes: indices,
            });
        }

        let diphones = DiphoneInventory::from_pairs(diphones.iter().copied(), p);
        Ok(Self::assemble(phonemes, diphones, scheme, entries))
    }

    fn assemble(
        phonemes: PhonemeInventory,
        diphones: DiphoneInventory,
        scheme: DiphoneScheme,
        words: Vec<Word>,
    ) -> Self {
        let mut by_phonemes = HashMap::with_capacity(words.len());
        let mut by_label = HashMap::with_capacity(words.len());
        for (idx, word) in words.iter().enumerate() {
            if by_phonemes.contains_key(&word.phonemes) {
                log::warn!("duplicate pronunciation {:?}; lookups resolve to the first entry", word.label);
                continue;
            }
            by_phonemes.insert(word.phonemes.clone(), idx);
            by_label.entry(word.label.clone()).or_insert(idx);
        }

        Self {
            phonemes,
            diphones,
            scheme,
            words,
            by_phonemes,
            by_label,
        }
    }

    /// Load a one-pronunciation-per-line lexicon file, with an optional
    /// one-symbol-per-line phoneme file
    pub fn load(
        path: impl AsRef<Path>,
        phoneme_path: Option<&Path>,
        scheme: DiphoneScheme,
    ) -> Result<Self> {
        let words = read_lines(path.as_ref())?;
        let extra = match phoneme_path {
            Some(p) => read_lines(p)?,
            None => Vec::new(),
        };
        log::debug!(
            "Loaded {} pronunciations from {}",
            words.len(),
            path.as_ref().display()
        );
        Self::with_phonemes(&words, &extra, scheme)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn phonemes(&self) -> &PhonemeInventory {
        &self.phonemes
    }

    pub fn diphones(&self) -> &DiphoneInventory {
        &self.diphones
    }

    pub fn scheme(&self) -> DiphoneScheme {
        self.scheme
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn word(&self, idx: usize) -> &Word {
        &self.words[idx]
    }

    pub fn phoneme_count(&self) -> usize {
        self.phonemes.len()
    }

    pub fn diphone_count(&self) -> usize {
        self.diphones.len()
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Length of the longest pronunciation
    pub fn max_word_len(&self) -> usize {
        self.words.iter().map(Word::len).max().unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Convert a pronunciation string to phoneme indices
    pub fn encode(&self, pronunciation: &str) -> Result<Vec<usize>> {
        tokenize(pronunciation)
            .iter()
            .map(|t| self.phonemes.lookup(t))
            .collect()
    }

    /// Word whose pronunciation is exactly `phonemes`
    pub fn find_word(&self, phonemes: &[usize]) -> Option<usize> {
        self.by_phonemes.get(phonemes).copied()
    }

    /// Word index by label (falls back to matching the tokenized pronunciation)
    pub fn word_index(&self, label: &str) -> Result<usize> {
        if let Some(&idx) = self.by_label.get(label.trim()) {
            return Ok(idx);
        }
        self.encode(label)
            .ok()
            .and_then(|phonemes| self.find_word(&phonemes))
            .ok_or_else(|| TiskError::UnknownWord(label.to_string()))
    }

    /// Diphone index by symbols
    pub fn diphone_index(&self, first: &str, second: &str) -> Result<usize> {
        let unknown = || TiskError::UnknownDiphone(join_symbols(&[first, second]));
        let a = self.phonemes.get(first).ok_or_else(unknown)?;
        let b = self.phonemes.get(second).ok_or_else(unknown)?;
        self.diphones.get(Diphone::new(a, b)).ok_or_else(unknown)
    }

    /// Diphone index by label (`"pa"` or `"ch a"`)
    pub fn diphone_by_label(&self, label: &str) -> Result<usize> {
        match tokenize(label).as_slice() {
            [first, second] => self.diphone_index(first, second),
            _ => Err(TiskError::UnknownDiphone(label.to_string())),
        }
    }

    /// Display label of a diphone
    pub fn diphone_label(&self, idx: usize) -> String {
        let pair = self.diphones.pair(idx);
        join_symbols(&[
            self.phonemes.symbol(pair.first),
            self.phonemes.symbol(pair.second),
        ])
    }

    /// Inventory indices of a pronunciation's open diphones.
    /// Pairs missing from a gapped inventory are skipped.
    pub fn open_diphones(&self, phonemes: &[usize]) -> Vec<usize> {
        open_pairs(phonemes)
            .into_iter()
            .filter_map(|pair| self.diphones.get(pair))
            .collect()
    }

    /// Inventory indices of a pronunciation's gap-limited diphones
    pub fn gapped_diphones(&self, phonemes: &[usize], gap: usize) -> Vec<usize> {
        gapped_pairs(phonemes, gap)
            .into_iter()
            .filter_map(|pair| self.diphones.get(pair))
            .collect()
    }
}

/// Non-empty trimmed lines of a text file
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("pat"), vec!["p", "a", "t"]);
        assert_eq!(tokenize(" ch a t "), vec!["ch", "a", "t"]);
        assert!(tokenize("  ").is_empty());
    }

    #[test]
    fn test_inventory_first_appearance_order() {
        let lex = Lexicon::new(&["pat", "tap", "bat"], DiphoneScheme::Full).unwrap();
        assert_eq!(lex.phonemes().symbols(), &["p", "a", "t", "b"]);
        assert_eq!(lex.diphone_count(), 16);
        assert_eq!(lex.max_word_len(), 3);
        assert_eq!(lex.word(1).phonemes, vec![2, 1, 0]);
    }

    #[test]
    fn test_extra_phonemes() {
        let lex = Lexicon::with_phonemes(&["pat"], &["k", "p"], DiphoneScheme::Full).unwrap();
        assert_eq!(lex.phoneme_count(), 4);
        assert_eq!(lex.phonemes().get("k"), Some(3));
    }

    #[test]
    fn test_open_pairs_dedup() {
        // p a t a: (p,a) appears twice, (a,a) is a self pair
        let pairs = open_pairs(&[0, 1, 2, 1]);
        assert_eq!(
            pairs,
            vec![
                Diphone::new(0, 1),
                Diphone::new(0, 2),
                Diphone::new(1, 2),
                Diphone::new(1, 1),
                Diphone::new(2, 1),
            ]
        );
    }

    #[test]
    fn test_gapped_pairs() {
        assert_eq!(
            gapped_pairs(&[0, 1, 2], 2),
            vec![Diphone::new(0, 1), Diphone::new(1, 2)]
        );
        assert_eq!(gapped_pairs(&[0, 1, 2], 10).len(), 3);
        assert!(gapped_pairs(&[0, 1, 2], 1).is_empty());
    }

    #[test]
    fn test_gapped_inventory() {
        let lex = Lexicon::new(&["pat", "tap"], DiphoneScheme::Gapped { gap: 2 }).unwrap();
        // pa, at, ta, ap
        assert_eq!(lex.diphone_count(), 4);
        assert!(lex.diphone_index("p", "t").is_err());
        assert!(lex.diphone_index("a", "t").is_ok());
        assert!(Lexicon::new(&["pat"], DiphoneScheme::Gapped { gap: 1 }).is_err());
    }

    #[test]
    fn test_closing_set_excludes_self_pairs() {
        let lex = Lexicon::new(&["pa"], DiphoneScheme::Full).unwrap();
        let closing = lex.diphones().closing_set(0);
        assert_eq!(closing.len(), 1);
        assert_eq!(lex.diphone_label(closing[0]), "pa");
    }

    #[test]
    fn test_word_features() {
        let features = word_features(&[0, 1, 0]);
        // p, a, pa, ap
        assert_eq!(features.len(), 4);
        assert!(features.contains(&Feature::Bigram(1, 0)));
        assert!(!features.contains(&Feature::Bigram(0, 0)));
    }

    #[test]
    fn test_lookup_errors() {
        let lex = Lexicon::new(&["pat", "tap"], DiphoneScheme::Full).unwrap();
        assert_eq!(lex.word_index("tap").unwrap(), 1);
        assert_eq!(lex.word_index("t a p").unwrap(), 1);
        assert!(matches!(lex.word_index("pit"), Err(TiskError::UnknownWord(_))));
        assert!(matches!(lex.encode("pix"), Err(TiskError::UnknownPhoneme(_))));
        assert!(matches!(lex.diphone_by_label("pxa"), Err(TiskError::UnknownDiphone(_))));
    }

    #[test]
    fn test_duplicate_resolves_to_first() {
        let lex = Lexicon::new(&["pat", "tap", "pat"], DiphoneScheme::Full).unwrap();
        assert_eq!(lex.word_count(), 3);
        assert_eq!(lex.word_index("pat").unwrap(), 0);
    }

    #[test]
    fn test_multichar_symbols() {
        let lex = Lexicon::new(&["ch a t", "t a ch"], DiphoneScheme::Full).unwrap();
        assert_eq!(lex.phoneme_count(), 3);
        let d = lex.diphone_index("ch", "a").unwrap();
        assert_eq!(lex.diphone_label(d), "ch a");
        assert_eq!(lex.diphone_by_label("ch a").unwrap(), d);
    }

    #[test]
    fn test_load_files() {
        let dir = tempfile::tempdir().unwrap();
        let words = dir.path().join("lexicon.txt");
        let phons = dir.path().join("phonemes.txt");
        let mut f = std::fs::File::create(&words).unwrap();
        writeln!(f, "pat\n\ntap  \nbat").unwrap();
        std::fs::write(&phons, "k\nz\n").unwrap();

        let lex = Lexicon::load(&words, Some(phons.as_path()), DiphoneScheme::Full).unwrap();
        assert_eq!(lex.word_count(), 3);
        assert_eq!(lex.phoneme_count(), 6);
        assert_eq!(lex.word(1).label, "tap");
    }

    #[test]
    fn test_from_parts_preserves_order() {
        let lex = Lexicon::new(&["pat", "tap"], DiphoneScheme::Gapped { gap: 3 }).unwrap();
        let words: Vec<String> = lex.words().iter().map(|w| w.label.clone()).collect();
        let rebuilt = Lexicon::from_parts(
            lex.phonemes().symbols(),
            lex.diphones().pairs(),
            &words,
            lex.scheme(),
        )
        .unwrap();
        assert_eq!(rebuilt.diphones().pairs(), lex.diphones().pairs());
        assert_eq!(rebuilt.word(1), lex.word(1));
    }

    #[test]
    fn test_empty_word_list() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            Lexicon::new(&empty, DiphoneScheme::Full),
            Err(TiskError::Config(_))
        ));
    }
}
