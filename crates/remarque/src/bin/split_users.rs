//! Split a JSON user table into test and control groups.
//!
//! Usage:
//!   cargo run --bin split_users --release -- --input users.json \[options\]
//!
//! The input is a JSON array of objects, one per user, with a `user` id and
//! any number of feature fields. The `SplittingResult` is written as JSON.
//!
//! Options:
//!   --input PATH     Input JSON records (required)
//!   --ratio R        Test group ratio in (0, 1) (default: 0.5)
//!   --seed N         Seed the tie-break coin flips (default: random)
//!   --bins N         Histogram bins of numeric distributions (default: 30)
//!   --out PATH       Output JSON file (default: stdout)
//!
//! Logging goes to stderr and honours `RUST_LOG` (default: `info`).

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use remarque::{FeatureTable, SplitConfig, SplitError, Splitter};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug)]
struct Args {
    input: PathBuf,
    ratio: Option<f64>,
    seed: Option<u64>,
    bins: Option<usize>,
    out: Option<PathBuf>,
}

const HELP: &str = "split_users\n\n  --input <path>   Input JSON records (required)\n  --ratio <r>      Test group ratio (default: 0.5)\n  --seed <n>       Random seed (default: random)\n  --bins <n>       Histogram bins (default: 30)\n  --out <path>     Output JSON file (default: stdout)";

fn parse_args() -> Result<Args, String> {
    let mut input: Option<PathBuf> = None;
    let mut ratio = None;
    let mut seed = None;
    let mut bins = None;
    let mut out = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| it.next().ok_or_else(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--input" => input = Some(PathBuf::from(value("--input")?)),
            "--ratio" => ratio = Some(parse(&value("--ratio")?, "--ratio")?),
            "--seed" => seed = Some(parse(&value("--seed")?, "--seed")?),
            "--bins" => bins = Some(parse(&value("--bins")?, "--bins")?),
            "--out" => out = Some(PathBuf::from(value("--out")?)),
            "--help" => {
                eprintln!("{HELP}");
                std::process::exit(0);
            }
            other => return Err(format!("unknown arg: {other}")),
        }
    }

    Ok(Args {
        input: input.ok_or("--input is required")?,
        ratio,
        seed,
        bins,
        out,
    })
}

fn parse<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T, String> {
    raw.parse().map_err(|_| format!("invalid value for {flag}: {raw}"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(args: &Args) -> Result<(), SplitError> {
    let raw = fs::read_to_string(&args.input)?;
    let records: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
    let table = FeatureTable::from_records(&records)?;
    info!(path = %args.input.display(), rows = table.n_rows(), "loaded users");

    let config = SplitConfig::builder()
        .maybe_split_ratio(args.ratio)
        .maybe_seed(args.seed)
        .maybe_histogram_bins(args.bins)
        .build()?;
    let result = Splitter::new(config).split(&table)?;

    for feature in result.flagged_features() {
        info!(feature, warnings = ?result.metrics[feature].warnings(), "imbalanced feature");
    }

    let json = serde_json::to_string_pretty(&result)?;
    match &args.out {
        Some(path) => {
            fs::write(path, json)?;
            info!(path = %path.display(), "wrote result");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn main() {
    init_tracing();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(&args) {
        error!(error = %e, "split failed");
        std::process::exit(1);
    }
}
