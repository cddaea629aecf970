use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use costline_core::valuation::optimizer::{self, OptimizeInput};

use crate::input;

/// Arguments for solving the margin that reaches a target total
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct OptimizeMarginArgs {
    /// Cost before margin
    #[arg(long)]
    pub base_cost: Option<Decimal>,

    /// Desired total after margin
    #[arg(long)]
    pub target_total: Option<Decimal>,

    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_optimize_margin(args: OptimizeMarginArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let optimize_input: OptimizeInput = if let Some(ref path) = args.input {
        input::file::read_document(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        OptimizeInput {
            base_cost: args
                .base_cost
                .ok_or("--base-cost is required (or provide --input)")?,
            target_total: args
                .target_total
                .ok_or("--target-total is required (or provide --input)")?,
        }
    };

    let result = optimizer::optimize_margin(&optimize_input)?;
    Ok(serde_json::to_value(result)?)
}
