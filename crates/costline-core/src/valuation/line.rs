use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::currency::{convert_from, RateTable};
use crate::settings::BudgetSettings;
use crate::tree::CostLine;
use crate::types::{with_metadata, ComputationOutput, Diagnostics, Money, Percent};
use crate::valuation::social;
use crate::CostlineResult;

/// Whether a line with children is valued from its children or its own fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMode {
    /// Lines with children are worth the sum of their children.
    #[default]
    Rollup,
    /// Only the line's own quantity, count and rate are used.
    Leaf,
}

/// A line amount in the target currency plus whatever went wrong getting it.
#[derive(Debug, Clone, PartialEq)]
pub struct Valued {
    pub amount: Money,
    pub diagnostics: Diagnostics,
}

// ---------------------------------------------------------------------------
// Function 1: valuate
// ---------------------------------------------------------------------------

/// Monetary total of a single line in `target_currency`.
///
/// Percentage lines are worth their pre-resolved `calculated_amount` (or 0);
/// resolving their base is the percentage resolver's job.
pub fn valuate(
    line: &CostLine,
    target_currency: &str,
    rates: &RateTable,
    use_alternate_rate: bool,
    mode: ValuationMode,
) -> Valued {
    let mut diagnostics = Diagnostics::new();
    let amount = valuate_into(
        line,
        target_currency,
        rates,
        use_alternate_rate,
        mode,
        &mut diagnostics,
    );
    Valued {
        amount,
        diagnostics,
    }
}

pub(crate) fn valuate_into(
    line: &CostLine,
    target_currency: &str,
    rates: &RateTable,
    use_alternate_rate: bool,
    mode: ValuationMode,
    diagnostics: &mut Diagnostics,
) -> Money {
    if line.is_percentage() {
        return line.calculated_amount.unwrap_or(Decimal::ZERO);
    }
    if mode == ValuationMode::Rollup && line.has_children() {
        return line
            .children
            .iter()
            .map(|child| {
                valuate_into(
                    child,
                    target_currency,
                    rates,
                    use_alternate_rate,
                    mode,
                    diagnostics,
                )
            })
            .sum();
    }
    leaf_amount(line, target_currency, rates, use_alternate_rate, diagnostics)
}

/// `quantity × count × rate + overtime` with the rate converted per unit
/// before multiplying. Percentage lines are not handled here.
pub(crate) fn leaf_amount(
    line: &CostLine,
    target_currency: &str,
    rates: &RateTable,
    use_alternate_rate: bool,
    diagnostics: &mut Diagnostics,
) -> Money {
    let source = line
        .currency
        .as_deref()
        .filter(|code| *code != target_currency);

    let rate = convert_from(
        line.effective_rate(use_alternate_rate),
        source,
        target_currency,
        rates,
        diagnostics,
    );
    let overtime = if line.overtime_amount.is_zero() {
        Decimal::ZERO
    } else {
        convert_from(
            line.overtime_amount,
            source,
            target_currency,
            rates,
            diagnostics,
        )
    };

    line.quantity_or_zero() * line.count_or_zero() * rate + overtime
}

/// Unconverted base of a line in its own currency: the figure social
/// charges are computed on.
pub fn raw_base(line: &CostLine, use_alternate_rate: bool) -> Money {
    if line.is_percentage() {
        return line.calculated_amount.unwrap_or(Decimal::ZERO);
    }
    line.quantity_or_zero() * line.count_or_zero() * line.effective_rate(use_alternate_rate)
        + line.overtime_amount
}

// ---------------------------------------------------------------------------
// Function 2: value_line (envelope)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineValuationInput {
    pub line: CostLine,
    #[serde(default)]
    pub mode: ValuationMode,
    #[serde(default)]
    pub settings: BudgetSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineValuationOutput {
    pub currency: String,
    pub amount: Money,
    /// Social charges of the line (or its leaves) in the target currency.
    pub social_charges: Money,
    pub charge_agency_percent: Percent,
    pub charge_margin_percent: Percent,
    /// `social_charges × (1 + agency/100 + margin/100)`
    pub charges_with_margins: Money,
}

/// Value one line together with its social charges.
pub fn value_line(
    input: &LineValuationInput,
) -> CostlineResult<ComputationOutput<LineValuationOutput>> {
    let start = Instant::now();
    input.settings.validate()?;
    let ctx = input.settings.context();
    let mut warnings: Vec<String> = Vec::new();

    let mut diagnostics = Diagnostics::new();
    let amount = valuate_into(
        &input.line,
        ctx.target_currency,
        ctx.rates,
        ctx.use_alternate_rate,
        input.mode,
        &mut diagnostics,
    );
    let social_charges = social::converted_charges(&input.line, input.mode, &ctx, &mut diagnostics);

    let margins = social::effective_margins(
        input.line.social_charge_type_id.as_deref(),
        ctx.charge_rates,
        social::Margins {
            agency_percent: input.settings.default_agency_percent,
            margin_percent: input.settings.default_margin_percent,
        },
    );
    let charges_with_margins = social::total_with_margins(
        social_charges,
        margins.agency_percent,
        margins.margin_percent,
    );

    if input.line.is_percentage() && input.line.calculated_amount.is_none() {
        warnings.push(format!(
            "Percentage line '{}' has no resolved amount; resolve its base first",
            input.line.id
        ));
    }

    let output = LineValuationOutput {
        currency: ctx.target_currency.to_string(),
        amount,
        social_charges,
        charge_agency_percent: margins.agency_percent,
        charge_margin_percent: margins.margin_percent,
        charges_with_margins,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Line valuation: quantity x count x rate + overtime, per-unit currency conversion",
        &serde_json::json!({
            "line_id": input.line.id,
            "mode": input.mode,
            "target_currency": ctx.target_currency,
            "use_alternate_rate": ctx.use_alternate_rate,
        }),
        warnings,
        diagnostics,
        elapsed,
        output,
    ))
}
