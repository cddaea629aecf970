use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use costline_core::currency::{self, ConvertInput, RateTable};

use crate::input;

/// Arguments for a single currency conversion
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct ConvertArgs {
    /// Amount to convert
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// Source currency code (e.g. USD)
    #[arg(long)]
    pub from: Option<String>,

    /// Target currency code; defaults to the settings display currency
    #[arg(long)]
    pub to: Option<String>,

    /// Path to a settings file providing the rate table
    #[arg(long)]
    pub settings: Option<String>,

    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_convert(args: ConvertArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let settings = input::load_settings(args.settings.as_deref())?;

    let convert_input: ConvertInput = if let Some(ref path) = args.input {
        input::file::read_document(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let to = match (args.to, settings.as_ref()) {
            (Some(code), _) => code,
            (None, Some(s)) => s.display_currency.clone(),
            (None, None) => return Err("--to is required (or provide --settings)".into()),
        };
        ConvertInput {
            amount: args
                .amount
                .ok_or("--amount is required (or provide --input)")?,
            from: args.from.ok_or("--from is required (or provide --input)")?,
            to,
            rates: settings
                .map(|s| s.rates)
                .unwrap_or_else(RateTable::new),
        }
    };

    let result = currency::convert_amount(&convert_input)?;
    Ok(serde_json::to_value(result)?)
}
