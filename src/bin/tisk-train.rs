//! tisk-train - Train phone → word weights and write a weight bundle
//!
//! # Usage
//!
//! ```bash
//! # Defaults: gap 10, 10 slots, 10 steps, 1000 epochs at lr 0.01
//! tisk-train lexicon.txt weights.tisk
//!
//! # Adjacent-only diphones, longer training
//! tisk-train lexicon.txt weights.tisk --gap 2 --epochs 5000
//! ```
//!
//! # Exit Codes
//!
//! - 0: Bundle written
//! - 1: Loading, training or writing failed
//! - 2: Invalid arguments

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use tisk::{DiphoneScheme, Lexicon, ModelConfig, TrainingConfig, WeightGenerator};
use tracing_subscriber::EnvFilter;

const DEFAULT_GAP: usize = 10;
const DEFAULT_SLOTS: usize = 10;

struct Args {
    lexicon: PathBuf,
    output: PathBuf,
    gap: usize,
    slots: usize,
    steps: Option<usize>,
    training: TrainingConfig,
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

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> std::result::Result<Option<Args>, String> {
    let mut positional = Vec::new();
    let mut gap = DEFAULT_GAP;
    let mut slots = DEFAULT_SLOTS;
    let mut steps = None;
    let mut training = TrainingConfig::default();

    while let Some(arg) = argv.next() {
        let mut value = |name: &str| argv.next().ok_or_else(|| format!("{} needs a value", name));
        match arg.as_str() {
            "--gap" => gap = parse_number("--gap", &value("--gap")?)?,
            "--slots" => slots = parse_number("--slots", &value("--slots")?)?,
            "--steps" => steps = Some(parse_number("--steps", &value("--steps")?)?),
            "--epochs" => training.epochs = parse_number("--epochs", &value("--epochs")?)?,
            "--lr" => training.learning_rate = parse_number("--lr", &value("--lr")?)?,
            "-h" | "--help" => return Ok(None),
            _ if arg.starts_with('-') => return Err(format!("Unknown option: {}", arg)),
            _ => positional.push(PathBuf::from(&arg)),
        }
    }

    let mut positional = positional.into_iter();
    match (positional.next(), positional.next(), positional.next()) {
        (Some(lexicon), Some(output), None) => Ok(Some(Args {
            lexicon,
            output,
            gap,
            slots,
            steps,
            training,
        })),
        (_, _, Some(extra)) => Err(format!("Unexpected argument: {}", extra.display())),
        _ => Err("Expected <LEXICON> and <OUTPUT>".to_string()),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> std::result::Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{} expects a number, got {:?}", name, value))
}

fn run(args: &Args) -> Result<()> {
    let scheme = DiphoneScheme::Gapped { gap: args.gap };
    let lexicon = Lexicon::load(&args.lexicon, None, scheme)
        .with_context(|| format!("Failed to load lexicon {}", args.lexicon.display()))?;

    let mut config = ModelConfig::new(args.slots);
    if let Some(steps) = args.steps {
        config = config.with_steps_per_slot(steps);
    }

    let mut generator = WeightGenerator::new(lexicon, config)?;
    println!(
        "Training {} words ({} phonemes, {} diphones) for {} epochs",
        generator.lexicon().word_count(),
        generator.lexicon().phoneme_count(),
        generator.lexicon().diphone_count(),
        args.training.epochs
    );

    let history = generator.train(&args.training);
    if let Some(last) = history.last() {
        println!(
            "Epoch {}: MSE {:.6}, target min {:.4}, non-target max {:.4}",
            last.epoch, last.mse, last.target_min, last.non_target_max
        );
    }

    generator.generate_wired_weights();
    generator
        .extract(&args.output)
        .with_context(|| format!("Failed to write bundle {}", args.output.display()))?;
    println!("  wrote {}", args.output.display());
    Ok(())
}

fn print_help() {
    eprintln!("tisk-train - Train phone to word weights into a .tisk bundle");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    tisk-train [OPTIONS] <LEXICON> <OUTPUT>");
    eprintln!();
    eprintln!("ARGS:");
    eprintln!("    <LEXICON>    One pronunciation per line");
    eprintln!("    <OUTPUT>     Bundle file to write");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    --gap <N>       Maximum diphone separation, at least 2 (default: 10)");
    eprintln!("    --slots <N>     Time slots (default: 10)");
    eprintln!("    --steps <N>     Sub-steps per slot (default: 10)");
    eprintln!("    --epochs <N>    Training epochs (default: 1000)");
    eprintln!("    --lr <X>        Learning rate (default: 0.01)");
    eprintln!("    -h, --help      Print this help message");
    eprintln!();
    eprintln!("EXIT CODES:");
    eprintln!("    0    Bundle written");
    eprintln!("    1    Loading, training or writing failed");
    eprintln!("    2    Invalid arguments");
}
