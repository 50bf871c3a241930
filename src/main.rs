use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use bayes_feed::{
    JsonReporter, Reporter, Simulation, SimulationConfig, SimulationError, TextReporter,
};
use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunMode {
    /// Estimate parameters and issue feed decisions.
    Control,
    /// Estimate parameters only.
    Estimate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Simulate a Bayesian line fit over noisy sensor data and drive feed rate from its uncertainty.
#[derive(Parser, Debug)]
#[command(name = "bayes-feed", version, about)]
struct Cli {
    /// JSON configuration file; defaults apply to missing fields.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = RunMode::Control)]
    mode: RunMode,

    /// Seed for the simulated sensor noise.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of observations to simulate.
    #[arg(long)]
    samples: Option<usize>,

    /// Safe uncertainty threshold; the stop threshold is twice this value.
    #[arg(long)]
    threshold: Option<f64>,

    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Log every posterior update.
    #[arg(short, long)]
    verbose: bool,
}

fn run(cli: &Cli) -> Result<(), SimulationError> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.generator.seed = Some(seed);
    }
    if let Some(samples) = cli.samples {
        config.generator.samples = samples;
    }
    if let Some(threshold) = cli.threshold {
        config.safe_threshold = threshold;
    }

    let mut simulation = Simulation::from_config(&config, cli.mode == RunMode::Control)?;
    let observations = config.sensor()?.observations();

    let stdout = io::stdout().lock();
    let mut reporter: Box<dyn Reporter> = match cli.format {
        Format::Text => Box::new(TextReporter::new(stdout)),
        Format::Json => Box::new(JsonReporter::new(stdout)),
    };
    simulation.run(&observations, reporter.as_mut())?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
