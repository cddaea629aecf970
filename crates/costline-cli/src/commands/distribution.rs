use clap::Args;
use serde_json::Value;

use costline_core::valuation::distribution::{self, DistributionInput};

use crate::input;

/// Arguments for the expense-bucket distribution report
#[derive(Args)]
pub struct DistributeArgs {
    /// Path to JSON/YAML input file with `categories` and `buckets`
    #[arg(long)]
    pub input: Option<String>,

    /// Settings file; replaces any settings embedded in the input
    #[arg(long)]
    pub settings: Option<String>,
}

pub fn run_distribute(args: DistributeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut report_input: DistributionInput = input::load(args.input.as_deref(), "distribute")?;
    if let Some(settings) = input::load_settings(args.settings.as_deref())? {
        report_input.settings = settings;
    }
    let result = distribution::distribution_report(&report_input)?;
    Ok(serde_json::to_value(result)?)
}
