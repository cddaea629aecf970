use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::currency::convert_from;
use crate::tree::{ChargeRate, CostLine};
use crate::types::{Diagnostics, Money, Percent, Rate};
use crate::valuation::line::{raw_base, ValuationMode};
use crate::valuation::ValuationContext;

/// Key under which charges from an override-only line are grouped.
pub const CUSTOM_CHARGE_TYPE: &str = "custom";

/// Agency and margin percentages applied together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    pub agency_percent: Percent,
    pub margin_percent: Percent,
}

pub fn find_charge_rate<'a>(table: &'a [ChargeRate], type_id: &str) -> Option<&'a ChargeRate> {
    table.iter().find(|r| r.id == type_id)
}

/// Fraction charged on the line: the override when set, otherwise the
/// table rate for the line's charge type.
pub fn charge_fraction(line: &CostLine, table: &[ChargeRate]) -> Option<Rate> {
    if let Some(rate) = line.social_charge_rate_override {
        return Some(rate);
    }
    let type_id = line.social_charge_type_id.as_deref()?;
    find_charge_rate(table, type_id).map(|r| r.rate)
}

/// Grouping key for a line's charges, `None` when it carries none.
pub fn charge_key(line: &CostLine) -> Option<&str> {
    match (&line.social_charge_type_id, line.social_charge_rate_override) {
        (Some(id), _) => Some(id.as_str()),
        (None, Some(_)) => Some(CUSTOM_CHARGE_TYPE),
        (None, None) => None,
    }
}

/// Social charge of a single line in the line's own currency:
/// `(quantity × count × rate + overtime) × fraction`.
pub fn charge_amount(line: &CostLine, table: &[ChargeRate], use_alternate_rate: bool) -> Money {
    match charge_fraction(line, table) {
        Some(fraction) => raw_base(line, use_alternate_rate) * fraction,
        None => Decimal::ZERO,
    }
}

/// `base × (1 + agency/100 + margin/100)`
pub fn total_with_margins(base: Money, agency_percent: Percent, margin_percent: Percent) -> Money {
    base * (Decimal::ONE + agency_percent / dec!(100) + margin_percent / dec!(100))
}

/// Per-type agency/margin when the charge type defines them, otherwise the
/// budget-wide defaults. Each side falls back independently.
pub fn effective_margins(
    type_id: Option<&str>,
    table: &[ChargeRate],
    defaults: Margins,
) -> Margins {
    let rate = type_id.and_then(|id| find_charge_rate(table, id));
    Margins {
        agency_percent: rate
            .and_then(|r| r.agency_percent)
            .unwrap_or(defaults.agency_percent),
        margin_percent: rate
            .and_then(|r| r.margin_percent)
            .unwrap_or(defaults.margin_percent),
    }
}

/// Charges of a line in the target currency; in rollup mode a line with
/// children is charged through its leaves.
pub(crate) fn converted_charges(
    line: &CostLine,
    mode: ValuationMode,
    ctx: &ValuationContext<'_>,
    diagnostics: &mut Diagnostics,
) -> Money {
    if mode == ValuationMode::Rollup && line.has_children() && !line.is_percentage() {
        return line
            .children
            .iter()
            .map(|child| converted_charges(child, mode, ctx, diagnostics))
            .sum();
    }
    let charge = charge_amount(line, ctx.charge_rates, ctx.use_alternate_rate);
    if charge.is_zero() {
        return charge;
    }
    let source = line
        .currency
        .as_deref()
        .filter(|code| *code != ctx.target_currency);
    convert_from(charge, source, ctx.target_currency, ctx.rates, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::RateTable;

    fn table() -> Vec<ChargeRate> {
        let mut artists = ChargeRate::new("artists", "Artists", dec!(0.45));
        artists.agency_percent = Some(dec!(5));
        vec![ChargeRate::new("techs", "Technicians", dec!(0.65)), artists]
    }

    #[test]
    fn test_charge_from_table() {
        let line = CostLine::post("dop", "DoP")
            .priced(dec!(5), dec!(1), dec!(800))
            .with_charge_type("techs");
        assert_eq!(charge_amount(&line, &table(), false), dec!(2600));
    }

    #[test]
    fn test_no_type_or_unknown_type_is_zero() {
        let line = CostLine::post("g", "Gaffer").priced(dec!(5), dec!(1), dec!(450));
        assert_eq!(charge_amount(&line, &table(), false), Decimal::ZERO);
        let line = line.with_charge_type("ghost");
        assert_eq!(charge_amount(&line, &table(), false), Decimal::ZERO);
    }

    #[test]
    fn test_override_wins_over_table() {
        let mut line = CostLine::post("dop", "DoP")
            .priced(dec!(5), dec!(1), dec!(800))
            .with_charge_type("techs");
        line.social_charge_rate_override = Some(dec!(0.20));
        assert_eq!(charge_amount(&line, &table(), false), dec!(800));

        line.social_charge_type_id = None;
        assert_eq!(charge_amount(&line, &table(), false), dec!(800));
        assert_eq!(charge_key(&line), Some(CUSTOM_CHARGE_TYPE));
    }

    #[test]
    fn test_zero_override_still_wins() {
        let mut line = CostLine::post("dop", "DoP")
            .priced(dec!(5), dec!(1), dec!(800))
            .with_charge_type("techs");
        line.social_charge_rate_override = Some(Decimal::ZERO);
        assert_eq!(charge_amount(&line, &table(), false), Decimal::ZERO);
    }

    #[test]
    fn test_charge_uses_alternate_rate_and_overtime() {
        let mut line = CostLine::post("x", "X")
            .priced(dec!(2), dec!(1), dec!(100))
            .with_charge_type("techs");
        line.alternate_rate = Some(dec!(50));
        line.overtime_amount = dec!(20);
        // (2 * 50 + 20) * 0.65 = 78
        assert_eq!(charge_amount(&line, &table(), true), dec!(78));
    }

    #[test]
    fn test_total_with_margins() {
        assert_eq!(total_with_margins(dec!(2600), dec!(10), dec!(15)), dec!(3250));
        assert_eq!(total_with_margins(dec!(100), Decimal::ZERO, Decimal::ZERO), dec!(100));
    }

    #[test]
    fn test_effective_margins_fall_back_per_side() {
        let defaults = Margins {
            agency_percent: dec!(10),
            margin_percent: dec!(15),
        };
        let m = effective_margins(Some("artists"), &table(), defaults);
        assert_eq!(m.agency_percent, dec!(5));
        assert_eq!(m.margin_percent, dec!(15));
        let m = effective_margins(Some("techs"), &table(), defaults);
        assert_eq!(m, defaults);
        assert_eq!(effective_margins(None, &table(), defaults), defaults);
    }

    #[test]
    fn test_converted_charges_rollup() {
        let rates = RateTable::new().with_rate("EUR", dec!(1)).with_rate("USD", dec!(2));
        let charge_rates = table();
        let ctx = ValuationContext {
            target_currency: "EUR",
            rates: &rates,
            charge_rates: &charge_rates,
            use_alternate_rate: false,
        };
        let parent = CostLine::post("crew", "Crew").with_children(vec![
            CostLine::sub_post("a", "A")
                .priced(dec!(1), dec!(1), dec!(100))
                .with_charge_type("techs"),
            CostLine::sub_post("b", "B")
                .priced(dec!(1), dec!(1), dec!(200))
                .with_currency("USD")
                .with_charge_type("artists"),
        ]);
        let mut diags = Diagnostics::new();
        // 65 + (90 USD -> 45 EUR)
        let total = converted_charges(&parent, ValuationMode::Rollup, &ctx, &mut diags);
        assert_eq!(total, dec!(110));
        assert!(diags.is_empty());
    }
}
