use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use costline_core::tree::Category;
use costline_core::valuation::aggregate::{self, AggregateInput};
use costline_core::valuation::fingerprint;
use costline_core::valuation::line::{self, LineValuationInput, ValuationMode};
use costline_core::valuation::percentage::{self, ResolveBaseInput};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Lines with children are worth the sum of their children
    Rollup,
    /// Every line is valued from its own fields
    Leaf,
}

impl From<ModeArg> for ValuationMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Rollup => ValuationMode::Rollup,
            ModeArg::Leaf => ValuationMode::Leaf,
        }
    }
}

/// Arguments for valuing a single line
#[derive(Args)]
pub struct ValueLineArgs {
    /// Path to JSON/YAML input file with `line` (and optional `settings`)
    #[arg(long)]
    pub input: Option<String>,

    /// Settings file; replaces any settings embedded in the input
    #[arg(long)]
    pub settings: Option<String>,

    /// Valuation mode; overrides the mode in the input
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,
}

/// Arguments for resolving a percentage base
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct ResolveBaseArgs {
    /// Path to JSON/YAML input file with `selected_references` and `categories`
    #[arg(long)]
    pub input: Option<String>,

    /// Settings file; replaces any settings embedded in the input
    #[arg(long)]
    pub settings: Option<String>,

    /// Also report `percent % × base` (e.g. 20 for 20%)
    #[arg(long)]
    pub percent: Option<Decimal>,

    /// Add the social charges of every counted line to the base
    #[arg(long)]
    pub include_social_charges: bool,
}

/// Arguments for computing a selection fingerprint
#[derive(Args)]
pub struct FingerprintArgs {
    /// Path to JSON/YAML input file with `selected_references` and `categories`
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for whole-budget totals
#[derive(Args)]
pub struct AggregateArgs {
    /// Path to JSON/YAML input file with `categories` (and optional `settings`)
    #[arg(long)]
    pub input: Option<String>,

    /// Settings file; replaces any settings embedded in the input
    #[arg(long)]
    pub settings: Option<String>,
}

#[derive(Deserialize)]
struct FingerprintInput {
    selected_references: Vec<String>,
    categories: Vec<Category>,
}

pub fn run_value_line(args: ValueLineArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut line_input: LineValuationInput = input::load(args.input.as_deref(), "value-line")?;
    if let Some(settings) = input::load_settings(args.settings.as_deref())? {
        line_input.settings = settings;
    }
    if let Some(mode) = args.mode {
        line_input.mode = mode.into();
    }
    let result = line::value_line(&line_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_resolve_base(args: ResolveBaseArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut base_input: ResolveBaseInput = input::load(args.input.as_deref(), "resolve-base")?;
    if let Some(settings) = input::load_settings(args.settings.as_deref())? {
        base_input.settings = settings;
    }
    if args.percent.is_some() {
        base_input.percent = args.percent;
    }
    if args.include_social_charges {
        base_input.include_social_charges = true;
    }
    let result = percentage::resolve_percentage_base(&base_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_fingerprint(args: FingerprintArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let fp_input: FingerprintInput = input::load(args.input.as_deref(), "fingerprint")?;
    let fp = fingerprint::fingerprint(&fp_input.selected_references, &fp_input.categories);
    Ok(serde_json::json!({
        "result": {
            "fingerprint": fp,
            "selected": fp_input.selected_references.len(),
        }
    }))
}

pub fn run_aggregate(args: AggregateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut budget: AggregateInput = input::load(args.input.as_deref(), "aggregate")?;
    if let Some(settings) = input::load_settings(args.settings.as_deref())? {
        budget.settings = settings;
    }
    let result = aggregate::aggregate_budget(&budget)?;
    Ok(serde_json::to_value(result)?)
}
