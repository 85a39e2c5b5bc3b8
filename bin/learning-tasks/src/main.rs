use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use tabled::Table;
use tracing::{info, warn};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use lsharp::{ExtensionRule, LSharp, SeparationRule, WMethodOracle};
use mealy::{MealySul, dot};

const CSV_FIELDS: [&str; 13] = [
    "model",
    "states",
    "inputs",
    "rounds",
    "learn_queries",
    "learn_steps",
    "test_resets",
    "test_steps",
    "tree_size",
    "extension_rule",
    "separation_rule",
    "seed",
    "time_ms",
];

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum ExtensionArg {
    #[default]
    Nothing,
    SepSeq,
    Ads,
}

impl From<ExtensionArg> for ExtensionRule {
    fn from(arg: ExtensionArg) -> Self {
        match arg {
            ExtensionArg::Nothing => ExtensionRule::Nothing,
            ExtensionArg::SepSeq => ExtensionRule::SepSeq,
            ExtensionArg::Ads => ExtensionRule::Ads,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum SeparationArg {
    #[default]
    SepSeq,
    Ads,
}

impl From<SeparationArg> for SeparationRule {
    fn from(arg: SeparationArg) -> Self {
        match arg {
            SeparationArg::SepSeq => SeparationRule::SepSeq,
            SeparationArg::Ads => SeparationRule::Ads,
        }
    }
}

/// Learn Mealy machines from DOT models with L# and a W-method oracle.
#[derive(Parser)]
struct Args {
    /// DOT files holding the reference models
    models: Vec<PathBuf>,
    /// Extra-states bound k of the W-method oracle
    #[arg(long, default_value_t = 2)]
    extra_states: usize,
    /// How completion queries are built
    #[arg(long, value_enum, default_value_t)]
    extension_rule: ExtensionArg,
    /// How identification queries are built
    #[arg(long, value_enum, default_value_t)]
    separation_rule: SeparationArg,
    /// Bound on the number of learning rounds
    #[arg(long, default_value_t = 75)]
    max_rounds: usize,
    /// Seed for reproducible shuffling of the test suite
    #[arg(long)]
    seed: Option<u64>,
    /// Append result rows to this CSV file
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn main() {
    // initialize logger
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::filter::LevelFilter::INFO),
        )
        .init();

    let args = Args::parse();
    if args.models.is_empty() {
        warn!("no models given, nothing to do");
        return;
    }

    let mut csv_writer = args.csv.as_ref().map(|path| {
        let existed = path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("cannot open CSV output file");
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if !existed {
            writer
                .write_record(CSV_FIELDS)
                .expect("cannot write CSV header");
        }
        writer
    });

    for path in &args.models {
        if let Err(err) = run_model(path, &args, csv_writer.as_mut()) {
            warn!("skipping {}: {err}", path.display());
        }
    }
    info!("done");
}

fn run_model(
    path: &PathBuf,
    args: &Args,
    csv_writer: Option<&mut csv::Writer<std::fs::File>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let reference = dot::parse_dot(&source)?;
    let alphabet = reference.input_alphabet();
    info!(
        "learning {} ({} states, {} inputs)",
        path.display(),
        reference.size(),
        alphabet.len()
    );

    let mut learner = LSharp::new(
        alphabet.clone(),
        MealySul::new(reference.clone()),
        WMethodOracle::new(alphabet.clone(), args.extra_states).with_recorded_tests(),
    )
    .with_extension_rule(args.extension_rule.into())
    .with_separation_rule(args.separation_rule.into())
    .with_max_rounds(args.max_rounds);
    if let Some(seed) = args.seed {
        learner = learner.with_seed(seed);
    }

    let start = Instant::now();
    let learned = learner.infer()?;
    let elapsed = start.elapsed();

    if let Some(diff) = learned.hypothesis.witness_inequivalence(&reference) {
        warn!(
            "learned machine disagrees with the reference on {:?}",
            diff
        );
    }
    info!(
        "learned {} states in {} ms",
        learned.hypothesis.size(),
        elapsed.as_millis()
    );
    println!("{}", Table::new([learned.stats]));

    if let Some(writer) = csv_writer {
        let stats = learned.stats;
        writer.write_record([
            path.display().to_string(),
            reference.size().to_string(),
            alphabet.len().to_string(),
            stats.learning_rounds.to_string(),
            stats.learn_queries.to_string(),
            stats.learn_steps.to_string(),
            stats.eq_oracle_resets.to_string(),
            stats.eq_oracle_steps.to_string(),
            stats.observation_tree_size.to_string(),
            ExtensionRule::from(args.extension_rule).to_string(),
            SeparationRule::from(args.separation_rule).to_string(),
            args.seed.map_or_else(String::new, |s| s.to_string()),
            elapsed.as_millis().to_string(),
        ])?;
        writer.flush()?;
    }
    Ok(())
}
