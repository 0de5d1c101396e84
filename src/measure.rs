//! Reaction times and lexical categories
//!
//! Three recognition criteria over a word trajectory (cycles × words), each
//! returning the first qualifying cycle or `None`:
//!
//! - **Absolute**: target above the criterion while every competitor is below
//! - **Relative**: target leads the strongest competitor by the criterion
//! - **Time-dependent**: target leads every competitor for `k` consecutive
//!   cycles; the reported cycle is the end of that window
//!
//! Competitors of a target in a single-word lexicon sit at 0.
//!
//! Categories group lexicon words by their relation to a target
//! pronunciation (cohort, rhyme, embedding), either overlapping or by
//! precedence, see [`CategoryMode`].

use crate::lexicon::Lexicon;
use ndarray::{Array1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Recognition criteria for the three reaction-time measures
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RtCriteria {
    pub absolute: f64,
    pub relative: f64,
    /// Consecutive cycles required by the time-dependent measure
    pub time: usize,
}

impl Default for RtCriteria {
    fn default() -> Self {
        Self {
            absolute: 0.75,
            relative: 0.05,
            time: 10,
        }
    }
}

/// Reaction times of one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReactionTimes {
    pub absolute: Option<usize>,
    pub relative: Option<usize>,
    pub time_dependent: Option<usize>,
}

impl ReactionTimes {
    pub fn measure(word: ArrayView2<'_, f64>, target: usize, criteria: &RtCriteria) -> Self {
        Self {
            absolute: rt_absolute(word, target, criteria.absolute),
            relative: rt_relative(word, target, criteria.relative),
            time_dependent: rt_time_dependent(word, target, criteria.time),
        }
    }
}

/// Highest competitor activation per cycle
pub fn others_max(word: ArrayView2<'_, f64>, target: usize) -> Array1<f64> {
    word.map_axis(Axis(1), |row| {
        row.iter()
            .enumerate()
            .filter(|&(idx, _)| idx != target)
            .map(|(_, &a)| a)
            .fold(0.0, f64::max)
    })
}

/// First cycle with target > criterion and every competitor < criterion
pub fn rt_absolute(word: ArrayView2<'_, f64>, target: usize, criterion: f64) -> Option<usize> {
    let others = others_max(word, target);
    word.column(target)
        .iter()
        .zip(others.iter())
        .position(|(&t, &o)| t > criterion && o < criterion)
}

/// First cycle with target > strongest competitor + criterion
pub fn rt_relative(word: ArrayView2<'_, f64>, target: usize, criterion: f64) -> Option<usize> {
    let others = others_max(word, target);
    word.column(target)
        .iter()
        .zip(others.iter())
        .position(|(&t, &o)| t > o + criterion)
}

/// End of the first window of `criterion` cycles where the target leads
pub fn rt_time_dependent(word: ArrayView2<'_, f64>, target: usize, criterion: usize) -> Option<usize> {
    let others = others_max(word, target);
    let leading: Vec<bool> = word
        .column(target)
        .iter()
        .zip(others.iter())
        .map(|(&t, &o)| t > o)
        .collect();

    let cycles = leading.len();
    (0..cycles.saturating_sub(criterion))
        .find(|&start| leading[start..start + criterion].iter().all(|&l| l))
        .map(|start| start + criterion)
}

// ============================================================================
// Summaries
// ============================================================================

/// Aggregate of one criterion over a list of runs
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CriterionSummary {
    /// Mean RT over responding runs, NaN when none responded
    pub mean_rt: f64,
    /// Responding runs / total runs
    pub response_rate: f64,
}

impl CriterionSummary {
    fn from_times<I: IntoIterator<Item = Option<usize>>>(times: I) -> Self {
        let (mut total, mut hits, mut sum) = (0usize, 0usize, 0.0);
        for time in times {
            total += 1;
            if let Some(cycle) = time {
                hits += 1;
                sum += cycle as f64;
            }
        }
        Self {
            mean_rt: if hits == 0 { f64::NAN } else { sum / hits as f64 },
            response_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }
}

/// Mean RT and response rate for all three criteria
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RtSummary {
    pub absolute: CriterionSummary,
    pub relative: CriterionSummary,
    pub time_dependent: CriterionSummary,
}

impl RtSummary {
    pub fn from_times(times: &[ReactionTimes]) -> Self {
        Self {
            absolute: CriterionSummary::from_times(times.iter().map(|t| t.absolute)),
            relative: CriterionSummary::from_times(times.iter().map(|t| t.relative)),
            time_dependent: CriterionSummary::from_times(times.iter().map(|t| t.time_dependent)),
        }
    }
}

// ============================================================================
// Categories
// ============================================================================

/// How a competitor matching several relations is counted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryMode {
    /// Cohort, rhyme and embedding are tested independently
    #[default]
    Overlapping,
    /// First match wins: target > cohort > rhyme > embedding > other
    Exclusive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Target,
    Cohort,
    Rhyme,
    Embedding,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Target,
        Category::Cohort,
        Category::Rhyme,
        Category::Embedding,
        Category::Other,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Target => "Target",
            Category::Cohort => "Cohort",
            Category::Rhyme => "Rhyme",
            Category::Embedding => "Embedding",
            Category::Other => "Other",
        }
    }
}

/// Word indices per category for one target
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categories {
    pub target: Vec<usize>,
    pub cohort: Vec<usize>,
    pub rhyme: Vec<usize>,
    pub embedding: Vec<usize>,
    pub other: Vec<usize>,
}

impl Categories {
    pub fn get(&self, category: Category) -> &[usize] {
        match category {
            Category::Target => &self.target,
            Category::Cohort => &self.cohort,
            Category::Rhyme => &self.rhyme,
            Category::Embedding => &self.embedding,
            Category::Other => &self.other,
        }
    }
}

fn is_cohort(target: &[usize], word: &[usize]) -> bool {
    target[..target.len().min(2)] == word[..word.len().min(2)]
}

fn is_rhyme(target: &[usize], word: &[usize]) -> bool {
    match (target.split_first(), word.split_first()) {
        (Some((t0, t_rest)), Some((w0, w_rest))) => t0 != w0 && t_rest == w_rest,
        _ => false,
    }
}

fn is_embedded(target: &[usize], word: &[usize]) -> bool {
    !word.is_empty() && word.len() <= target.len() && target.windows(word.len()).any(|w| w == word)
}

/// Group every lexicon word by its relation to `target`
pub fn classify(lexicon: &Lexicon, target: &[usize], mode: CategoryMode) -> Categories {
    let mut categories = Categories::default();
    for (idx, word) in lexicon.words().iter().enumerate() {
        let word = word.phonemes.as_slice();
        if word == target {
            categories.target.push(idx);
            continue;
        }
        let cohort = is_cohort(target, word);
        let rhyme = is_rhyme(target, word);
        let embedded = is_embedded(target, word);

        match mode {
            CategoryMode::Overlapping => {
                if cohort {
                    categories.cohort.push(idx);
                }
                if rhyme {
                    categories.rhyme.push(idx);
                }
                if embedded {
                    categories.embedding.push(idx);
                }
                if !(cohort || rhyme || embedded) {
                    categories.other.push(idx);
                }
            }
            CategoryMode::Exclusive => {
                let bucket = if cohort {
                    &mut categories.cohort
                } else if rhyme {
                    &mut categories.rhyme
                } else if embedded {
                    &mut categories.embedding
                } else {
                    &mut categories.other
                };
                bucket.push(idx);
            }
        }
    }
    categories
}

/// Categories of every lexicon word as a target, in word order
pub fn category_index(lexicon: &Lexicon, mode: CategoryMode) -> Vec<Categories> {
    lexicon
        .words()
        .iter()
        .map(|word| classify(lexicon, &word.phonemes, mode))
        .collect()
}

/// Mean competitor counts over a list of targets
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CategoryCounts {
    pub cohort: f64,
    pub rhyme: f64,
    pub embedding: f64,
    pub other: f64,
}

pub fn mean_category_counts(lexicon: &Lexicon, targets: &[Vec<usize>], mode: CategoryMode) -> CategoryCounts {
    if targets.is_empty() {
        return CategoryCounts::default();
    }
    let mut counts = CategoryCounts::default();
    for target in targets {
        let c = classify(lexicon, target, mode);
        counts.cohort += c.cohort.len() as f64;
        counts.rhyme += c.rhyme.len() as f64;
        counts.embedding += c.embedding.len() as f64;
        counts.other += c.other.len() as f64;
    }
    let n = targets.len() as f64;
    CategoryCounts {
        cohort: counts.cohort / n,
        rhyme: counts.rhyme / n,
        embedding: counts.embedding / n,
        other: counts.other / n,
    }
}

/// Mean activation of a word set per cycle; empty sets give zeros
pub fn mean_curve(word: ArrayView2<'_, f64>, members: &[usize]) -> Array1<f64> {
    if members.is_empty() {
        return Array1::zeros(word.nrows());
    }
    let mut curve = Array1::zeros(word.nrows());
    for &member in members {
        curve += &word.column(member);
    }
    curve / members.len() as f64
}

/// Mean activation curve per category, in [`Category::ALL`] order
pub fn category_curves(word: ArrayView2<'_, f64>, categories: &Categories) -> Vec<(Category, Array1<f64>)> {
    Category::ALL
        .iter()
        .map(|&category| (category, mean_curve(word, categories.get(category))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::DiphoneScheme;
    use ndarray::{array, Array2};

    fn bark_lexicon() -> Lexicon {
        Lexicon::new(&["bar", "bark", "dark", "ark"], DiphoneScheme::Full).unwrap()
    }

    #[test]
    fn test_classify_overlapping() {
        let lex = bark_lexicon();
        let bark = lex.encode("bark").unwrap();
        let c = classify(&lex, &bark, CategoryMode::Overlapping);
        assert_eq!(c.target, vec![1]);
        assert_eq!(c.cohort, vec![0]);
        assert_eq!(c.rhyme, vec![2]);
        assert_eq!(c.embedding, vec![0, 3]);
        assert!(c.other.is_empty());
    }

    #[test]
    fn test_classify_exclusive() {
        let lex = bark_lexicon();
        let bark = lex.encode("bark").unwrap();
        let c = classify(&lex, &bark, CategoryMode::Exclusive);
        assert_eq!(c.target, vec![1]);
        assert_eq!(c.cohort, vec![0]);
        assert_eq!(c.rhyme, vec![2]);
        assert_eq!(c.embedding, vec![3]);
        assert!(c.other.is_empty());
    }

    #[test]
    fn test_classify_short_words_and_other() {
        let lex = Lexicon::new(&["a", "ab", "ba", "kit"], DiphoneScheme::Full).unwrap();
        let a = lex.encode("a").unwrap();
        let c = classify(&lex, &a, CategoryMode::Overlapping);
        assert_eq!(c.target, vec![0]);
        // "ab"[..2] != "a"
        assert!(c.cohort.is_empty());
        assert!(c.rhyme.is_empty());
        assert!(c.embedding.is_empty());
        assert_eq!(c.other, vec![1, 2, 3]);

        let ba = lex.encode("ba").unwrap();
        let c = classify(&lex, &ba, CategoryMode::Overlapping);
        assert_eq!(c.embedding, vec![0]);
        assert_eq!(c.other, vec![1, 3]);
    }

    #[test]
    fn test_category_index_and_counts() {
        let lex = bark_lexicon();
        let index = category_index(&lex, CategoryMode::Overlapping);
        assert_eq!(index.len(), 4);
        assert_eq!(index[1], classify(&lex, &lex.word(1).phonemes, CategoryMode::Overlapping));

        let targets = vec![lex.encode("bark").unwrap(), lex.encode("ark").unwrap()];
        let counts = mean_category_counts(&lex, &targets, CategoryMode::Overlapping);
        // bark: cohort 1, rhyme 1, embedding 2; ark: other 3
        assert_eq!(counts.cohort, 0.5);
        assert_eq!(counts.rhyme, 0.5);
        assert_eq!(counts.embedding, 1.0);
        assert_eq!(counts.other, 1.5);
    }

    #[test]
    fn test_rt_criteria() {
        // target column 0
        let word = array![
            [0.10, 0.20],
            [0.40, 0.30],
            [0.70, 0.30],
            [0.80, 0.35],
            [0.90, 0.80],
            [0.95, 0.70],
        ];
        assert_eq!(rt_absolute(word.view(), 0, 0.75), Some(3));
        assert_eq!(rt_relative(word.view(), 0, 0.05), Some(1));
        assert_eq!(rt_time_dependent(word.view(), 0, 2), Some(3));
        assert_eq!(rt_time_dependent(word.view(), 0, 6), None);
        assert_eq!(rt_absolute(word.view(), 1, 0.75), None);
    }

    #[test]
    fn test_rt_single_word() {
        let word = array![[0.0], [0.5], [0.8]];
        let rt = ReactionTimes::measure(word.view(), 0, &RtCriteria::default());
        assert_eq!(rt.absolute, Some(2));
        assert_eq!(rt.relative, Some(1));
        assert_eq!(rt.time_dependent, None);
    }

    #[test]
    fn test_summary() {
        let times = [
            ReactionTimes {
                absolute: Some(10),
                relative: Some(4),
                time_dependent: None,
            },
            ReactionTimes {
                absolute: None,
                relative: Some(6),
                time_dependent: None,
            },
        ];
        let summary = RtSummary::from_times(&times);
        assert_eq!(summary.absolute.mean_rt, 10.0);
        assert_eq!(summary.absolute.response_rate, 0.5);
        assert_eq!(summary.relative.mean_rt, 5.0);
        assert_eq!(summary.relative.response_rate, 1.0);
        assert!(summary.time_dependent.mean_rt.is_nan());
        assert_eq!(summary.time_dependent.response_rate, 0.0);
    }

    #[test]
    fn test_category_curves() {
        let word: Array2<f64> = array![[0.2, 0.4, 0.0, 1.0], [0.6, 0.8, 0.0, 1.0]];
        let categories = Categories {
            target: vec![3],
            cohort: vec![0, 1],
            ..Categories::default()
        };
        let curves = category_curves(word.view(), &categories);
        assert_eq!(curves.len(), 5);
        assert_eq!(curves[0], (Category::Target, array![1.0, 1.0]));
        let (_, cohort) = &curves[1];
        assert!((cohort[0] - 0.3).abs() < 1e-12);
        assert!((cohort[1] - 0.7).abs() < 1e-12);
        assert_eq!(curves[2].1, array![0.0, 0.0]);
    }
}
