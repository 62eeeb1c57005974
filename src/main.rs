//! Regime rotator CLI.
//!
//! # Run the rotator and print the JSON status envelope
//! regime-rotator run --config config/default.json --data data/macro.csv
//!
//! # Human-readable summary
//! regime-rotator run --config config/default.json --data data/macro.csv --format summary
//!
//! # Validate a configuration without data
//! regime-rotator check-config --config config/default.json
//!
//! # Sweep the regime thresholds
//! regime-rotator sweep --config config/default.json --data data/macro.csv --grid config/grid.json

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;

use regime_rotator::data::load_csv;
use regime_rotator::pipeline::{ErrorReport, RegimeRotator, RunOutcome};
use regime_rotator::sweep::{sweep, ParameterGrid};
use regime_rotator::RotatorConfig;

#[derive(Parser)]
#[command(name = "regime-rotator")]
#[command(about = "Two-state macro regime rotator with backtesting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Summary,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a dataset
    Run {
        /// Path to JSON configuration file
        #[arg(short, long)]
        config: String,

        /// Path to aligned CSV data file
        #[arg(short, long)]
        data: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: Format,
    },

    /// Validate a configuration file
    CheckConfig {
        /// Path to JSON configuration file
        #[arg(short, long)]
        config: String,
    },

    /// Grid search over iceberg threshold, hysteresis and confirmation periods
    Sweep {
        /// Path to JSON configuration file
        #[arg(short, long)]
        config: String,

        /// Path to aligned CSV data file
        #[arg(short, long)]
        data: String,

        /// Path to JSON parameter grid (defaults to the built-in grid)
        #[arg(short, long)]
        grid: Option<String>,

        /// Number of ranked results to print
        #[arg(short, long, default_value_t = 10)]
        top: usize,
    },
}

/// Load, bind and run; every failure ends up in the envelope.
fn run_pipeline(config: &str, data: &str) -> RunOutcome {
    let prepared = RotatorConfig::from_json_file(config).and_then(|cfg| {
        let rotator = RegimeRotator::new(cfg)?;
        let dataset = load_csv(data, rotator.config())?;
        Ok((dataset, rotator))
    });
    match prepared {
        Ok((dataset, rotator)) => rotator.evaluate(&dataset),
        Err(e) => RunOutcome::Error(ErrorReport::from(&e)),
    }
}

fn cmd_run(config: &str, data: &str, format: Format) -> Result<bool> {
    let outcome = run_pipeline(config, data);
    match (&outcome, format) {
        (RunOutcome::Ok(report), Format::Summary) => println!("{}", report.summary()),
        (RunOutcome::Error(e), Format::Summary) => {
            error!("{} failed: {}", e.kind, e.message);
            println!("Error ({}): {}", e.kind, e.message);
        }
        (_, Format::Json) => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }
    Ok(outcome.is_ok())
}

fn cmd_check_config(config: &str) -> Result<bool> {
    let cfg = RotatorConfig::from_json_file(config)
        .with_context(|| format!("Failed to load config: {}", config))?;
    match RegimeRotator::new(cfg) {
        Ok(rotator) => {
            let cfg = rotator.config();
            println!("Config OK");
            println!("  Leading series: {}", cfg.leading.len());
            println!("  Coincident series: {}", cfg.coincident.len());
            println!("  Filters: {}", cfg.filters.len());
            println!(
                "  Iceberg: {}, recovery: {}, sinking: {}",
                cfg.iceberg_threshold,
                cfg.recovery_threshold(),
                cfg.sinking_threshold
            );
            println!("  Rebalance: {}", cfg.backtest.rebalance_on.as_str());
            Ok(true)
        }
        Err(e) => {
            println!("Invalid config: {}", e);
            Ok(false)
        }
    }
}

fn cmd_sweep(config: &str, data: &str, grid: Option<&str>, top: usize) -> Result<bool> {
    let cfg = RotatorConfig::from_json_file(config)
        .with_context(|| format!("Failed to load config: {}", config))?;
    let grid = match grid {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read grid: {}", path))?;
            serde_json::from_str::<ParameterGrid>(&text)?
        }
        None => ParameterGrid::default(),
    };
    let dataset = load_csv(data, &cfg).with_context(|| format!("Failed to load data: {}", data))?;
    let result = sweep(&cfg, &grid, &dataset)?;
    println!("{}", result.summary(top));
    Ok(true)
}

fn main() -> Result<ExitCode> {
    // Initialize logging; stdout carries the report
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("regime_rotator=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let ok = match cli.command {
        Commands::Run {
            config,
            data,
            format,
        } => cmd_run(&config, &data, format)?,
        Commands::CheckConfig { config } => cmd_check_config(&config)?,
        Commands::Sweep {
            config,
            data,
            grid,
            top,
        } => cmd_sweep(&config, &data, grid.as_deref(), top)?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
