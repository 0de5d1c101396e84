//! Run-list results and tab-separated exports
//!
//! Table layouts (one header row, then one row per target and unit; the
//! trailing columns are cycles `0..T·I`):
//!
//! | Table          | Header                                     |
//! |----------------|--------------------------------------------|
//! | reaction times | `Target Absolute Relative Time_Dependent`  |
//! | phoneme        | `Target Phoneme Position 0 1 …`            |
//! | diphone        | `Target Diphone 0 1 …`                     |
//! | single phone   | `Target Single_Phone 0 1 …`                |
//! | word           | `Target Word 0 1 …`                        |
//! | categories     | `Target Category 0 1 …`                    |
//!
//! Raw and category tables list targets in sorted order and units in
//! sorted label order. A missing reaction time is written as `nan`.

use crate::engine::Trajectories;
use crate::error::{Result, TiskError};
use crate::lexicon::Lexicon;
use crate::measure::{Categories, Category, ReactionTimes, RtSummary};
use ndarray::{Array1, ArrayView1};
use std::io::Write;
use std::time::Duration;

/// Outcome of one run-list item
#[derive(Clone, Debug, PartialEq)]
pub struct ItemResult {
    /// Item as given to the run list
    pub label: String,
    /// Lexicon index of the target word
    pub target: usize,
    pub reaction_times: ReactionTimes,
    pub categories: Categories,
    /// Mean word activation per category, in [`Category::ALL`] order
    pub category_curves: Vec<(Category, Array1<f64>)>,
}

/// Results of [`TiskModel::run_list`](crate::model::TiskModel::run_list)
#[derive(Clone, Debug)]
pub struct RunListReport {
    pub cycles: usize,
    pub items: Vec<ItemResult>,
    pub summary: RtSummary,
    /// Per-item trajectories, in item order; empty unless requested
    pub trajectories: Vec<Trajectories>,
    pub elapsed: Duration,
}

impl RunListReport {
    /// Category curves pooled over every item: each competitor word counts
    /// once per item it appears in
    pub fn mean_category_curves(&self) -> Vec<(Category, Array1<f64>)> {
        Category::ALL
            .iter()
            .map(|&category| {
                let mut sum = Array1::zeros(self.cycles);
                let mut members = 0usize;
                for item in &self.items {
                    let n = item.categories.get(category).len();
                    if n == 0 {
                        continue;
                    }
                    if let Some((_, curve)) = item.category_curves.iter().find(|(c, _)| *c == category) {
                        sum += &(curve * n as f64);
                        members += n;
                    }
                }
                if members > 0 {
                    sum /= members as f64;
                }
                (category, sum)
            })
            .collect()
    }

    /// Item indices ordered by label
    fn sorted_items(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.sort_by(|&a, &b| self.items[a].label.cmp(&self.items[b].label));
        order
    }

    fn require_trajectories(&self) -> Result<()> {
        if self.trajectories.len() != self.items.len() {
            return Err(TiskError::Config(
                "raw tables need a run list with keep_trajectories enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Print the summary to stderr
    pub fn print_report(&self) {
        eprintln!(
            "Simulated {} items in {:.3}s",
            self.items.len(),
            self.elapsed.as_secs_f64()
        );
        let rows = [
            ("Absolute", self.summary.absolute),
            ("Relative", self.summary.relative),
            ("Time_Dependent", self.summary.time_dependent),
        ];
        for (name, criterion) in rows {
            eprintln!(
                "  {:<15} mean RT {:>8.2}  accuracy {:.3}",
                name, criterion.mean_rt, criterion.response_rate
            );
        }
    }
}

fn cycle_header(cycles: usize) -> String {
    (0..cycles).map(|c| c.to_string()).collect::<Vec<_>>().join("\t")
}

fn join_values(values: ArrayView1<'_, f64>) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("\t")
}

fn format_rt(rt: Option<usize>) -> String {
    rt.map_or_else(|| "nan".to_string(), |c| c.to_string())
}

/// Indices ordered by their labels
fn sorted_by_label(labels: Vec<String>) -> Vec<(String, usize)> {
    let mut pairs: Vec<(String, usize)> = labels.into_iter().enumerate().map(|(i, l)| (l, i)).collect();
    pairs.sort();
    pairs
}

/// Reaction-time table, items in run order
pub fn write_reaction_times<W: Write>(out: &mut W, report: &RunListReport) -> Result<()> {
    writeln!(out, "Target\tAbsolute\tRelative\tTime_Dependent")?;
    for item in &report.items {
        let rt = &item.reaction_times;
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            item.label,
            format_rt(rt.absolute),
            format_rt(rt.relative),
            format_rt(rt.time_dependent)
        )?;
    }
    Ok(())
}

/// Phoneme activations: one row per target, phoneme and slot
pub fn write_phoneme_table<W: Write>(out: &mut W, lexicon: &Lexicon, report: &RunListReport) -> Result<()> {
    report.require_trajectories()?;
    writeln!(out, "Target\tPhoneme\tPosition\t{}", cycle_header(report.cycles))?;

    let p = lexicon.phoneme_count();
    let phonemes = sorted_by_label(lexicon.phonemes().symbols().to_vec());
    for idx in report.sorted_items() {
        let trajectory = &report.trajectories[idx];
        let slots = trajectory.phoneme.ncols() / p.max(1);
        for (symbol, phoneme) in &phonemes {
            for slot in 0..slots {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    report.items[idx].label,
                    symbol,
                    slot,
                    join_values(trajectory.phoneme.column(slot * p + phoneme))
                )?;
            }
        }
    }
    Ok(())
}

/// Diphone activations: one row per target and diphone
pub fn write_diphone_table<W: Write>(out: &mut W, lexicon: &Lexicon, report: &RunListReport) -> Result<()> {
    report.require_trajectories()?;
    writeln!(out, "Target\tDiphone\t{}", cycle_header(report.cycles))?;

    let diphones = sorted_by_label((0..lexicon.diphone_count()).map(|d| lexicon.diphone_label(d)).collect());
    for idx in report.sorted_items() {
        for (label, d) in &diphones {
            writeln!(
                out,
                "{}\t{}\t{}",
                report.items[idx].label,
                label,
                join_values(report.trajectories[idx].diphone.column(*d))
            )?;
        }
    }
    Ok(())
}

/// Single-phone activations: one row per target and phoneme
pub fn write_single_phone_table<W: Write>(out: &mut W, lexicon: &Lexicon, report: &RunListReport) -> Result<()> {
    report.require_trajectories()?;
    writeln!(out, "Target\tSingle_Phone\t{}", cycle_header(report.cycles))?;

    let phonemes = sorted_by_label(lexicon.phonemes().symbols().to_vec());
    for idx in report.sorted_items() {
        for (symbol, p) in &phonemes {
            writeln!(
                out,
                "{}\t{}\t{}",
                report.items[idx].label,
                symbol,
                join_values(report.trajectories[idx].single_phone.column(*p))
            )?;
        }
    }
    Ok(())
}

/// Word activations: one row per target and lexicon word
pub fn write_word_table<W: Write>(out: &mut W, lexicon: &Lexicon, report: &RunListReport) -> Result<()> {
    report.require_trajectories()?;
    writeln!(out, "Target\tWord\t{}", cycle_header(report.cycles))?;

    let words = sorted_by_label(lexicon.words().iter().map(|w| w.label.clone()).collect());
    for idx in report.sorted_items() {
        for (label, w) in &words {
            writeln!(
                out,
                "{}\t{}\t{}",
                report.items[idx].label,
                label,
                join_values(report.trajectories[idx].word.column(*w))
            )?;
        }
    }
    Ok(())
}

/// Category-averaged word activations: five rows per target
pub fn write_category_table<W: Write>(out: &mut W, report: &RunListReport) -> Result<()> {
    writeln!(out, "Target\tCategory\t{}", cycle_header(report.cycles))?;
    for idx in report.sorted_items() {
        let item = &report.items[idx];
        for (category, curve) in &item.category_curves {
            writeln!(out, "{}\t{}\t{}", item.label, category.name(), join_values(curve.view()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::DiphoneScheme;
    use crate::model::{RunListOptions, TiskModel};
    use crate::params::ModelConfig;

    fn report(keep: bool) -> (TiskModel, RunListReport) {
        let lexicon = Lexicon::new(&["pat", "tap"], DiphoneScheme::Full).unwrap();
        let model = TiskModel::wired(lexicon, ModelConfig::new(10)).unwrap();
        let options = RunListOptions {
            keep_trajectories: keep,
            ..RunListOptions::default()
        };
        let report = model.run_list(&["tap", "pat"], &options).unwrap();
        (model, report)
    }

    fn lines(buf: Vec<u8>) -> Vec<String> {
        String::from_utf8(buf).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_reaction_time_table() {
        let (_, report) = report(false);
        let mut buf = Vec::new();
        write_reaction_times(&mut buf, &report).unwrap();
        let lines = lines(buf);
        assert_eq!(lines[0], "Target\tAbsolute\tRelative\tTime_Dependent");
        assert_eq!(lines[2], "pat\t47\t20\t22");
        assert!(lines[1].starts_with("tap\t"));
    }

    #[test]
    fn test_nan_for_missing_rt() {
        assert_eq!(format_rt(None), "nan");
        assert_eq!(format_rt(Some(3)), "3");
    }

    #[test]
    fn test_raw_tables() {
        let (model, report) = report(true);
        let lexicon = model.lexicon();

        let mut buf = Vec::new();
        write_phoneme_table(&mut buf, lexicon, &report).unwrap();
        let phoneme = lines(buf);
        // header + 2 targets × 3 phonemes × 10 slots
        assert_eq!(phoneme.len(), 1 + 60);
        assert!(phoneme[0].starts_with("Target\tPhoneme\tPosition\t0\t1"));
        assert!(phoneme[1].starts_with("pat\ta\t0\t"));
        assert_eq!(phoneme[1].split('\t').count(), 3 + 100);

        let mut buf = Vec::new();
        write_diphone_table(&mut buf, lexicon, &report).unwrap();
        let diphone = lines(buf);
        assert_eq!(diphone.len(), 1 + 18);
        assert!(diphone[1].starts_with("pat\taa\t"));

        let mut buf = Vec::new();
        write_single_phone_table(&mut buf, lexicon, &report).unwrap();
        assert_eq!(lines(buf).len(), 1 + 6);

        let mut buf = Vec::new();
        write_word_table(&mut buf, lexicon, &report).unwrap();
        let word = lines(buf);
        assert_eq!(word[0].split('\t').take(2).collect::<Vec<_>>(), vec!["Target", "Word"]);
        assert!(word[1].starts_with("pat\tpat\t"));
        assert!(word[4].starts_with("tap\ttap\t"));
    }

    #[test]
    fn test_raw_tables_need_trajectories() {
        let (model, report) = report(false);
        let mut buf = Vec::new();
        assert!(matches!(
            write_word_table(&mut buf, model.lexicon(), &report),
            Err(TiskError::Config(_))
        ));
    }

    #[test]
    fn test_category_table() {
        let (_, report) = report(false);
        let mut buf = Vec::new();
        write_category_table(&mut buf, &report).unwrap();
        let lines = lines(buf);
        assert_eq!(lines.len(), 1 + 10);
        let names: Vec<&str> = lines[1..6].iter().map(|l| l.split('\t').nth(1).unwrap()).collect();
        assert_eq!(names, vec!["Target", "Cohort", "Rhyme", "Embedding", "Other"]);
        assert!(lines[1].starts_with("pat\tTarget\t"));
        // pat vs tap: no shared onset, rhyme or embedding
        assert!(lines[5].starts_with("pat\tOther\t"));
    }

    #[test]
    fn test_export_to_file() {
        let (_, report) = report(false);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_Reaction_Time.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        write_reaction_times(&mut file, &report).unwrap();
        drop(file);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_mean_category_curves() {
        let (_, report) = report(false);
        let curves = report.mean_category_curves();
        assert_eq!(curves.len(), 5);
        let (category, cohort) = &curves[1];
        assert_eq!(*category, Category::Cohort);
        assert!(cohort.iter().all(|&v| v == 0.0));
        let (_, target) = &curves[0];
        assert!(target[99] > 0.75);
    }
}
