//! tisk-run - Simulate a word list and export reaction times
//!
//! # Usage
//!
//! ```bash
//! # Hand-wired model over a lexicon, every word as a target
//! tisk-run lexicon.txt
//!
//! # Selected items, raw activations and category curves to files
//! tisk-run lexicon.txt --items items.txt --out results/run --raw --categorize
//!
//! # Trained weights from tisk-train
//! tisk-run --bundle weights.tisk --items items.txt
//! ```
//!
//! # Exit Codes
//!
//! - 0: Simulation finished
//! - 1: Loading, simulation or export failed
//! - 2: Invalid arguments

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tisk::report::{
    write_category_table, write_diphone_table, write_phoneme_table, write_reaction_times,
    write_single_phone_table, write_word_table,
};
use tisk::{CategoryMode, DiphoneScheme, Lexicon, ModelConfig, RunListOptions, TiskModel};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Args {
    lexicon: Option<PathBuf>,
    phonemes: Option<PathBuf>,
    bundle: Option<PathBuf>,
    items: Option<PathBuf>,
    out: Option<String>,
    slots: Option<usize>,
    steps: Option<usize>,
    threshold: Option<f64>,
    options: RunListOptions,
    raw: bool,
    categorize: bool,
    verbose: bool,
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Err(message) => {
            eprintln!("Error: {}\n", message);
            print_help();
            return ExitCode::from(2);
        }
    };

    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> std::result::Result<Option<Args>, String> {
    let mut args = Args::default();

    while let Some(arg) = argv.next() {
        let mut value = |name: &str| argv.next().ok_or_else(|| format!("{} needs a value", name));
        match arg.as_str() {
            "--phonemes" => args.phonemes = Some(value("--phonemes")?.into()),
            "--bundle" => args.bundle = Some(value("--bundle")?.into()),
            "--items" => args.items = Some(value("--items")?.into()),
            "--out" => args.out = Some(value("--out")?),
            "--slots" => args.slots = Some(parse_number("--slots", &value("--slots")?)?),
            "--steps" => args.steps = Some(parse_number("--steps", &value("--steps")?)?),
            "--threshold" => args.threshold = Some(parse_number("--threshold", &value("--threshold")?)?),
            "--batch" => args.options.batch_size = parse_number("--batch", &value("--batch")?)?,
            "--abs" => args.options.criteria.absolute = parse_number("--abs", &value("--abs")?)?,
            "--rel" => args.options.criteria.relative = parse_number("--rel", &value("--rel")?)?,
            "--time" => args.options.criteria.time = parse_number("--time", &value("--time")?)?,
            "--exclusive" => args.options.category_mode = CategoryMode::Exclusive,
            "--raw" => args.raw = true,
            "--categorize" => args.categorize = true,
            "-v" | "--verbose" => args.verbose = true,
            "-h" | "--help" => return Ok(None),
            _ if arg.starts_with('-') => return Err(format!("Unknown option: {}", arg)),
            _ if args.lexicon.is_none() => args.lexicon = Some(PathBuf::from(&arg)),
            _ => return Err(format!("Unexpected argument: {}", arg)),
        }
    }

    if args.lexicon.is_none() && args.bundle.is_none() {
        return Err("No lexicon or bundle specified".to_string());
    }
    if args.bundle.is_some() && (args.slots.is_some() || args.steps.is_some() || args.threshold.is_some()) {
        return Err("--slots, --steps and --threshold come from the bundle".to_string());
    }
    if (args.raw || args.categorize) && args.out.is_none() {
        return Err("--raw and --categorize need --out".to_string());
    }
    args.options.keep_trajectories = args.raw;
    Ok(Some(args))
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> std::result::Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{} expects a number, got {:?}", name, value))
}

fn build_model(args: &Args) -> Result<TiskModel> {
    if let Some(bundle) = &args.bundle {
        return TiskModel::load_bundle(bundle)
            .with_context(|| format!("Failed to load bundle {}", bundle.display()));
    }

    let path = args.lexicon.as_deref().context("No lexicon specified")?;
    let lexicon = Lexicon::load(path, args.phonemes.as_deref(), DiphoneScheme::Full)
        .with_context(|| format!("Failed to load lexicon {}", path.display()))?;

    let mut config = ModelConfig::for_lexicon(&lexicon);
    if let Some(slots) = args.slots {
        config = config.with_time_slots(slots);
    }
    if let Some(steps) = args.steps {
        config = config.with_steps_per_slot(steps);
    }
    if let Some(threshold) = args.threshold {
        config = config.with_threshold(threshold);
    }
    Ok(TiskModel::wired(lexicon, config)?)
}

fn read_items(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read items {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn create(prefix: &str, suffix: &str) -> Result<BufWriter<File>> {
    let path = format!("{}_{}.txt", prefix, suffix);
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path))?;
    Ok(BufWriter::new(file))
}

fn run(args: &Args) -> Result<()> {
    let model = build_model(args)?;
    if args.verbose {
        eprint!("{}", model.config());
    }

    let items = match &args.items {
        Some(path) => read_items(path)?,
        None => model.lexicon().words().iter().map(|w| w.label.clone()).collect(),
    };

    let report = model.run_list(&items, &args.options)?;

    match &args.out {
        Some(prefix) => {
            let mut out = create(prefix, "Reaction_Time")?;
            write_reaction_times(&mut out, &report)?;
            out.flush()?;

            if args.raw {
                let lexicon = model.lexicon();
                let mut out = create(prefix, "Phoneme_Activation_Data")?;
                write_phoneme_table(&mut out, lexicon, &report)?;
                out.flush()?;
                let mut out = create(prefix, "Diphone_Activation_Data")?;
                write_diphone_table(&mut out, lexicon, &report)?;
                out.flush()?;
                let mut out = create(prefix, "Single_Phone_Activation_Data")?;
                write_single_phone_table(&mut out, lexicon, &report)?;
                out.flush()?;
                let mut out = create(prefix, "Word_Activation_Data")?;
                write_word_table(&mut out, lexicon, &report)?;
                out.flush()?;
            }
            if args.categorize {
                let mut out = create(prefix, "Category_Activation_Data")?;
                write_category_table(&mut out, &report)?;
                out.flush()?;
            }
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            write_reaction_times(&mut out, &report)?;
        }
    }

    report.print_report();
    Ok(())
}

fn default_log_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}

/// Install the `tracing` fmt subscriber; `log` records reach it through
/// the `tracing-log` bridge. `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_help() {
    eprintln!("tisk-run - Simulate spoken word recognition over a word list");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    tisk-run [OPTIONS] <LEXICON>");
    eprintln!("    tisk-run [OPTIONS] --bundle <FILE>");
    eprintln!();
    eprintln!("ARGS:");
    eprintln!("    <LEXICON>    One pronunciation per line");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    --phonemes <FILE>    Extra phoneme symbols, one per line");
    eprintln!("    --slots <N>          Time slots (default: longest word)");
    eprintln!("    --steps <N>          Sub-steps per slot (default: 10)");
    eprintln!("    --threshold <X>      nPhone threshold (default: from slots and steps)");
    eprintln!("    --bundle <FILE>      Run trained weights written by tisk-train");
    eprintln!("    --items <FILE>       Targets, one per line (default: every word)");
    eprintln!("    --batch <N>          Items per simulation batch (default: 100)");
    eprintln!("    --abs <X>            Absolute RT criterion (default: 0.75)");
    eprintln!("    --rel <X>            Relative RT criterion (default: 0.05)");
    eprintln!("    --time <N>           Time-dependent RT criterion (default: 10)");
    eprintln!("    --exclusive          Exclusive category assignment");
    eprintln!("    --out <PREFIX>       Write tables to <PREFIX>_*.txt");
    eprintln!("    --raw                Also write per-layer activation tables");
    eprintln!("    --categorize         Also write category activation table");
    eprintln!("    -v, --verbose        Print parameters and debug logging (RUST_LOG overrides)");
    eprintln!("    -h, --help           Print this help message");
    eprintln!();
    eprintln!("EXIT CODES:");
    eprintln!("    0    Simulation finished");
    eprintln!("    1    Loading, simulation or export failed");
    eprintln!("    2    Invalid arguments");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> std::result::Result<Option<Args>, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_verbose_raises_log_level() {
        let quiet = args(&["lex.txt"]).unwrap().unwrap();
        let loud = args(&["lex.txt", "-v"]).unwrap().unwrap();
        assert!(!quiet.verbose);
        assert!(loud.verbose);
        assert_eq!(default_log_level(quiet.verbose), "warn");
        assert_eq!(default_log_level(loud.verbose), "debug");
        assert!(EnvFilter::try_new(default_log_level(true)).is_ok());
    }

    #[test]
    fn test_parse_args_rejects_bad_combinations() {
        assert!(args(&[]).is_err());
        assert!(args(&["lex.txt", "--raw"]).is_err());
        assert!(args(&["--bundle", "w.tisk", "--slots", "4"]).is_err());
        assert!(args(&["lex.txt", "--bogus"]).is_err());
        assert!(args(&["-h"]).unwrap().is_none());

        let parsed = args(&["lex.txt", "--raw", "--out", "run"]).unwrap().unwrap();
        assert!(parsed.options.keep_trajectories);
    }
}
