mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::budget::{AggregateArgs, FingerprintArgs, ResolveBaseArgs, ValueLineArgs};
use commands::currency::ConvertArgs;
use commands::distribution::DistributeArgs;
use commands::optimizer::OptimizeMarginArgs;

/// Production budget valuation
#[derive(Parser)]
#[command(
    name = "costline",
    version,
    about = "Production budget valuation",
    long_about = "A CLI for valuing hierarchical production budgets with decimal precision. \
                  Supports multi-currency line valuation, percentage lines over arbitrary \
                  selections, social charges, agency and margin roll-ups, expense-bucket \
                  distribution and margin targeting."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log computation details to stderr (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an amount between currencies
    Convert(ConvertArgs),
    /// Value one line (and its children) with social charges
    ValueLine(ValueLineArgs),
    /// Resolve the deduplicated base of a percentage selection
    ResolveBase(ResolveBaseArgs),
    /// Structural fingerprint of a selection
    Fingerprint(FingerprintArgs),
    /// Whole-budget totals with charges, agency and margin
    Aggregate(AggregateArgs),
    /// Distribute line amounts across expense buckets
    Distribute(DistributeArgs),
    /// Solve the margin percentage that reaches a target total
    OptimizeMargin(OptimizeMarginArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Convert(args) => commands::currency::run_convert(args),
        Commands::ValueLine(args) => commands::budget::run_value_line(args),
        Commands::ResolveBase(args) => commands::budget::run_resolve_base(args),
        Commands::Fingerprint(args) => commands::budget::run_fingerprint(args),
        Commands::Aggregate(args) => commands::budget::run_aggregate(args),
        Commands::Distribute(args) => commands::distribution::run_distribute(args),
        Commands::OptimizeMargin(args) => commands::optimizer::run_optimize_margin(args),
        Commands::Version => {
            println!("costline {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
