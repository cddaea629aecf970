use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::settings::BudgetSettings;
use crate::tree::{Category, CostLine};
use crate::types::{with_metadata, ComputationOutput, Diagnostics, Money, Percent};
use crate::valuation::percentage::Resolver;
use crate::valuation::social::{self, charge_key, Margins};
use crate::CostlineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateInput {
    pub categories: Vec<Category>,
    #[serde(default)]
    pub settings: BudgetSettings,
}

/// Totals of one category, charges excluded from `base_cost`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub id: String,
    pub name: String,
    pub base_cost: Money,
    pub social_charges: Money,
}

/// Social charges accumulated for one charge type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeTypeTotal {
    pub type_id: String,
    pub label: String,
    pub amount: Money,
    pub agency_percent: Percent,
    pub margin_percent: Percent,
    /// `amount × (1 + agency/100 + margin/100)`
    pub total_with_margins: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetTotals {
    pub currency: String,
    pub base_cost: Money,
    pub social_charges: Money,
    /// base_cost + social_charges
    pub total_cost: Money,
    /// Value-weighted average of line agency percentages
    pub weighted_agency_percent: Percent,
    /// Value-weighted average of line margin percentages
    pub weighted_margin_percent: Percent,
    pub agency: Money,
    pub margin: Money,
    /// total_cost + agency + margin
    pub grand_total: Money,
    pub charges_by_type: Vec<ChargeTypeTotal>,
    pub categories: Vec<CategoryTotal>,
}

/// Totals plus the non-fatal conditions met while computing them.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub totals: BudgetTotals,
    pub diagnostics: Diagnostics,
}

#[derive(Default)]
struct Accumulator {
    base_cost: Money,
    weighted_agency: Decimal,
    weighted_margin: Decimal,
    charges: BTreeMap<String, Money>,
}

// ---------------------------------------------------------------------------
// Function 1: aggregate
// ---------------------------------------------------------------------------

/// Sum every line of the budget into base cost, social charges and the
/// margin-adjusted grand total.
///
/// The social-charges pseudo-category is skipped: it only groups charge rows
/// for display and would otherwise be counted twice.
pub fn aggregate(categories: &[Category], settings: &BudgetSettings) -> Aggregation {
    let ctx = settings.context();
    let resolver = Resolver::new(categories, ctx);
    let mut diagnostics = Diagnostics::new();
    let mut acc = Accumulator::default();
    let mut category_totals = Vec::new();
    let defaults = Margins {
        agency_percent: settings.default_agency_percent,
        margin_percent: settings.default_margin_percent,
    };

    for category in categories {
        if category.is_social_charges_group() {
            tracing::trace!(category = %category.id, "skipping social-charges group");
            continue;
        }
        let base_before = acc.base_cost;
        let charges_before: Money = acc.charges.values().copied().sum();
        for line in &category.children {
            accumulate(&resolver, line, defaults, &mut acc, &mut diagnostics);
        }
        let charges_after: Money = acc.charges.values().copied().sum();
        category_totals.push(CategoryTotal {
            id: category.id.clone(),
            name: category.name.clone(),
            base_cost: acc.base_cost - base_before,
            social_charges: charges_after - charges_before,
        });
    }

    let (weighted_agency_percent, weighted_margin_percent) = if acc.base_cost > Decimal::ZERO {
        (
            acc.weighted_agency / acc.base_cost,
            acc.weighted_margin / acc.base_cost,
        )
    } else {
        (defaults.agency_percent, defaults.margin_percent)
    };

    let mut charges_by_type = Vec::with_capacity(acc.charges.len());
    let mut social_charges = Decimal::ZERO;
    let mut charge_agency = Decimal::ZERO;
    let mut charge_margin = Decimal::ZERO;
    for (type_id, amount) in acc.charges {
        let margins = social::effective_margins(Some(&type_id), ctx.charge_rates, defaults);
        let label = social::find_charge_rate(ctx.charge_rates, &type_id)
            .map(|r| r.label.clone())
            .unwrap_or_else(|| type_id.clone());
        social_charges += amount;
        charge_agency += amount * margins.agency_percent / dec!(100);
        charge_margin += amount * margins.margin_percent / dec!(100);
        charges_by_type.push(ChargeTypeTotal {
            total_with_margins: social::total_with_margins(
                amount,
                margins.agency_percent,
                margins.margin_percent,
            ),
            type_id,
            label,
            amount,
            agency_percent: margins.agency_percent,
            margin_percent: margins.margin_percent,
        });
    }

    let base_cost = acc.base_cost;
    let total_cost = base_cost + social_charges;
    let agency = base_cost * weighted_agency_percent / dec!(100) + charge_agency;
    let margin = base_cost * weighted_margin_percent / dec!(100) + charge_margin;
    let grand_total = total_cost + agency + margin;

    tracing::debug!(
        %base_cost,
        %social_charges,
        %grand_total,
        diagnostics = diagnostics.len(),
        "budget aggregated"
    );

    Aggregation {
        totals: BudgetTotals {
            currency: ctx.target_currency.to_string(),
            base_cost,
            social_charges,
            total_cost,
            weighted_agency_percent,
            weighted_margin_percent,
            agency,
            margin,
            grand_total,
            charges_by_type,
            categories: category_totals,
        },
        diagnostics,
    }
}

fn accumulate(
    resolver: &Resolver<'_>,
    line: &CostLine,
    defaults: Margins,
    acc: &mut Accumulator,
    diagnostics: &mut Diagnostics,
) {
    if line.has_children() && !line.is_percentage() {
        for child in &line.children {
            accumulate(resolver, child, defaults, acc, diagnostics);
        }
        return;
    }

    let value = resolver.line_value(line, diagnostics);
    acc.base_cost += value;
    acc.weighted_agency += value * line.agency_percent.unwrap_or(defaults.agency_percent);
    acc.weighted_margin += value * line.margin_percent.unwrap_or(defaults.margin_percent);

    if let Some(key) = charge_key(line) {
        let charge = resolver.line_charges(line, value, diagnostics);
        *acc.charges.entry(key.to_string()).or_insert(Decimal::ZERO) += charge;
    }
}

// ---------------------------------------------------------------------------
// Function 2: aggregate_budget (envelope)
// ---------------------------------------------------------------------------

pub fn aggregate_budget(input: &AggregateInput) -> CostlineResult<ComputationOutput<BudgetTotals>> {
    let start = Instant::now();
    input.settings.validate()?;
    let mut warnings: Vec<String> = Vec::new();

    let aggregation = aggregate(&input.categories, &input.settings);

    if aggregation.totals.base_cost <= Decimal::ZERO {
        warnings.push(
            "Base cost is not positive: default agency/margin percentages used".to_string(),
        );
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Bottom-up budget aggregation with value-weighted agency/margin and per-type charge margins",
        &serde_json::json!({
            "display_currency": input.settings.display_currency,
            "default_agency_percent": input.settings.default_agency_percent.to_string(),
            "default_margin_percent": input.settings.default_margin_percent.to_string(),
            "use_alternate_rate": input.settings.use_alternate_rate,
            "categories": input.categories.len(),
        }),
        warnings,
        aggregation.diagnostics,
        elapsed,
        aggregation.totals,
    ))
}
