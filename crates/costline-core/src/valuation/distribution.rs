use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use crate::settings::BudgetSettings;
use crate::tree::{Category, CostLine, DistributionKind, ExpenseBucket};
use crate::types::{with_metadata, ComputationOutput, Diagnostic, Diagnostics, Money};
use crate::valuation::line::{valuate_into, ValuationMode};
use crate::valuation::percentage::Resolver;
use crate::valuation::social::converted_charges;
use crate::valuation::ValuationContext;
use crate::CostlineResult;

/// Source of a line's distributable amounts: `(base, social charges)`, both
/// in the valuation currency.
pub trait LineAmounts {
    fn amounts(&self, line: &CostLine, diagnostics: &mut Diagnostics) -> (Money, Money);
}

/// Values lines on their own: percentage lines use `calculated_amount`.
impl LineAmounts for ValuationContext<'_> {
    fn amounts(&self, line: &CostLine, diagnostics: &mut Diagnostics) -> (Money, Money) {
        let base = valuate_into(
            line,
            self.target_currency,
            self.rates,
            self.use_alternate_rate,
            ValuationMode::Rollup,
            diagnostics,
        );
        let charges = converted_charges(line, ValuationMode::Rollup, self, diagnostics);
        (base, charges)
    }
}

/// Values lines against the whole snapshot: percentage lines are resolved.
impl LineAmounts for Resolver<'_> {
    fn amounts(&self, line: &CostLine, diagnostics: &mut Diagnostics) -> (Money, Money) {
        let base = self.subtree_value(line, false, diagnostics);
        let with_charges = self.subtree_value(line, true, diagnostics);
        (base, with_charges - base)
    }
}

/// Bucket amounts attributed from one line and its descendants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distributed {
    pub amounts: BTreeMap<String, Money>,
    pub diagnostics: Diagnostics,
}

impl Distributed {
    pub fn total(&self) -> Money {
        self.amounts.values().copied().sum()
    }
}

// ---------------------------------------------------------------------------
// Function 1: distribute
// ---------------------------------------------------------------------------

/// Split `base_amount` (and optionally `social_charge_amount`) of `line`
/// across expense buckets, then do the same for every descendant using
/// amounts from `values`. Same-bucket contributions are summed.
///
/// - percentage: `(base + charges?) × amount / 100`
/// - fixed: `amount`, plus `charges × amount / base` when charges are
///   carried; a zero base carries no charges.
pub fn distribute(
    line: &CostLine,
    buckets: &[ExpenseBucket],
    base_amount: Money,
    social_charge_amount: Money,
    values: &impl LineAmounts,
) -> Distributed {
    let known: HashSet<&str> = buckets.iter().map(|b| b.id.as_str()).collect();
    let mut out = Distributed::default();
    distribute_into(
        line,
        &known,
        base_amount,
        social_charge_amount,
        values,
        &mut out,
    );
    out
}

fn distribute_into(
    line: &CostLine,
    known: &HashSet<&str>,
    base_amount: Money,
    social_charge_amount: Money,
    values: &impl LineAmounts,
    out: &mut Distributed,
) {
    let carried_charges = if line.include_social_charges_in_distribution {
        social_charge_amount
    } else {
        Decimal::ZERO
    };

    for d in &line.distributions {
        if !known.contains(d.bucket_id.as_str()) {
            out.diagnostics.push(Diagnostic::UnresolvedReference {
                id: d.bucket_id.clone(),
            });
            continue;
        }
        let amount = match d.kind {
            DistributionKind::Percentage => (base_amount + carried_charges) * d.amount / dec!(100),
            DistributionKind::Fixed => {
                let share = if base_amount.is_zero() {
                    Decimal::ZERO
                } else {
                    carried_charges * d.amount / base_amount
                };
                d.amount + share
            }
        };
        *out.amounts.entry(d.bucket_id.clone()).or_insert(Decimal::ZERO) += amount;
    }

    for child in &line.children {
        let (child_base, child_charges) = values.amounts(child, &mut out.diagnostics);
        distribute_into(child, known, child_base, child_charges, values, out);
    }
}

// ---------------------------------------------------------------------------
// Function 2: distribution_report (envelope)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionInput {
    pub categories: Vec<Category>,
    pub buckets: Vec<ExpenseBucket>,
    #[serde(default)]
    pub settings: BudgetSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketTotal {
    pub bucket_id: String,
    pub name: String,
    pub amount: Money,
}

/// Distribution of one top-level line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDistribution {
    pub line_id: String,
    pub name: String,
    pub base_amount: Money,
    pub social_charges: Money,
    pub amounts: BTreeMap<String, Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionReport {
    pub currency: String,
    /// Every defined bucket, in definition order, zero when unused.
    pub buckets: Vec<BucketTotal>,
    pub distributed_total: Money,
    /// Base cost of the lines walked, charges excluded.
    pub budget_base: Money,
    /// `budget_base - distributed_total`; negative when carried charges
    /// push the distributed amounts past the base.
    pub undistributed: Money,
    pub lines: Vec<LineDistribution>,
}

/// Distribute every top-level line of the budget and total the buckets.
pub fn distribution_report(
    input: &DistributionInput,
) -> CostlineResult<ComputationOutput<DistributionReport>> {
    let start = Instant::now();
    input.settings.validate()?;
    let mut warnings: Vec<String> = Vec::new();

    let ctx = input.settings.context();
    let resolver = Resolver::new(&input.categories, ctx);
    let mut diagnostics = Diagnostics::new();
    let mut totals: BTreeMap<String, Money> = BTreeMap::new();
    let mut lines = Vec::new();
    let mut budget_base = Decimal::ZERO;

    for category in input.categories.iter().filter(|c| !c.is_social_charges_group()) {
        for line in &category.children {
            let (base, charges) = resolver.amounts(line, &mut diagnostics);
            budget_base += base;
            let distributed = distribute(line, &input.buckets, base, charges, &resolver);
            diagnostics.extend(distributed.diagnostics);
            if distributed.amounts.is_empty() {
                continue;
            }
            for (bucket, amount) in &distributed.amounts {
                *totals.entry(bucket.clone()).or_insert(Decimal::ZERO) += *amount;
            }
            lines.push(LineDistribution {
                line_id: line.id.clone(),
                name: line.name.clone(),
                base_amount: base,
                social_charges: charges,
                amounts: distributed.amounts,
            });
        }
    }

    let buckets: Vec<BucketTotal> = input
        .buckets
        .iter()
        .map(|b| BucketTotal {
            bucket_id: b.id.clone(),
            name: b.name.clone(),
            amount: totals.get(&b.id).copied().unwrap_or(Decimal::ZERO),
        })
        .collect();
    let distributed_total: Money = buckets.iter().map(|b| b.amount).sum();

    if input.buckets.is_empty() {
        warnings.push("No expense buckets defined: nothing can be distributed".to_string());
    }

    let output = DistributionReport {
        currency: ctx.target_currency.to_string(),
        buckets,
        distributed_total,
        budget_base,
        undistributed: budget_base - distributed_total,
        lines,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Expense-bucket distribution of line amounts (percentage or fixed, optional social charges)",
        &serde_json::json!({
            "display_currency": input.settings.display_currency,
            "buckets": input.buckets.len(),
        }),
        warnings,
        diagnostics,
        elapsed,
        output,
    ))
}
