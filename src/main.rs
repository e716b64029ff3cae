//! `fewshot` - run the zero-shot classification experiment.
//!
//! Loads the configuration (TOML file, then environment, then flags), runs
//! the baseline and the projection sweep, and prints the JSON report to
//! stdout. Logs go to stderr. Exits with 1 on error.

use std::path::PathBuf;
use std::process::ExitCode;

use candle_fewshot::embeddings::CachePolicy;
use candle_fewshot::models::DeviceRequest;
use candle_fewshot::{Dataset, ExperimentConfig, ExperimentContext};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Zero-shot text classification with learned embedding projections
#[derive(Parser)]
#[command(name = "fewshot")]
#[command(version)]
#[command(about = "Zero-shot text classification with learned embedding projections")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding datasets, word vectors and cached embeddings
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Dataset identifier (subdirectory of the data directory)
    #[arg(long)]
    dataset: Option<String>,

    /// Encoder device: cpu or cuda:N
    #[arg(long)]
    device: Option<DeviceRequest>,

    /// Embedding cache policy
    #[arg(long, value_parser = parse_policy)]
    cache: Option<CachePolicy>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_policy(s: &str) -> Result<CachePolicy, String> {
    match s {
        "read-write" => Ok(CachePolicy::ReadWrite),
        "read-only" => Ok(CachePolicy::ReadOnly),
        "refresh" => Ok(CachePolicy::Refresh),
        other => Err(format!(
            "unknown cache policy '{other}', expected read-write, read-only or refresh"
        )),
    }
}

fn load_config(cli: &Cli) -> candle_fewshot::Result<ExperimentConfig> {
    let config = match &cli.config {
        Some(path) => ExperimentConfig::from_file(path)?,
        None => ExperimentConfig::default(),
    };
    let mut config = config.with_env_overrides()?;

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dataset) = &cli.dataset {
        config.dataset = dataset.clone();
    }
    if let Some(device) = cli.device {
        config.encoder.device = device;
    }
    if let Some(policy) = cli.cache {
        config.cache.policy = policy;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> candle_fewshot::Result<()> {
    let config = load_config(cli)?;
    info!(dataset = %config.dataset, data_dir = %config.data_dir.display(), "starting experiment");

    let dataset = Dataset::from_config(&config)?;
    let context = ExperimentContext::from_config(config)?;
    let report = context.run(&dataset)?;

    let json = serde_json::to_string_pretty(&report)?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "experiment failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
