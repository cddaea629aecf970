use costline_core::currency::RateTable;
use costline_core::tree::{Category, ChargeRate, CostLine};
use costline_core::valuation::aggregate::aggregate;
use costline_core::valuation::fingerprint::fingerprint;
use costline_core::valuation::percentage::{
    resolve_base, resolve_percentage_base, value_percentage_line, ResolveBaseInput,
};
use costline_core::valuation::ValuationContext;
use costline_core::{BudgetSettings, Diagnostic};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Instant;

fn ids(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

/// Camera department with a nested lens package, plus a separate
/// production category.
fn budget() -> Vec<Category> {
    vec![
        Category::new(
            "camera",
            "Camera",
            vec![CostLine::sub_category("lenses", "Lenses").with_children(vec![
                CostLine::post("primes", "Prime set")
                    .with_children(vec![
                        CostLine::sub_post("p35", "35mm").priced(dec!(4), dec!(1), dec!(150)),
                        CostLine::sub_post("p50", "50mm").priced(dec!(4), dec!(1), dec!(100)),
                    ]),
                CostLine::post("zoom", "Zoom").priced(dec!(2), dec!(1), dec!(250)),
            ])],
        ),
        Category::new(
            "production",
            "Production",
            vec![
                CostLine::post("dop", "DoP")
                    .priced(dec!(5), dec!(1), dec!(800))
                    .with_charge_type("techs"),
                CostLine::post("gaffer", "Gaffer").priced(dec!(5), dec!(1), dec!(450)),
            ],
        ),
    ]
}

fn with_ctx<R>(f: impl FnOnce(&ValuationContext<'_>) -> R) -> R {
    let rates = RateTable::new();
    let charges = vec![ChargeRate::new("techs", "Technicians", dec!(0.65))];
    let ctx = ValuationContext {
        target_currency: "EUR",
        rates: &rates,
        charge_rates: &charges,
        use_alternate_rate: false,
    };
    f(&ctx)
}

// ===========================================================================
// Base resolution
// ===========================================================================

#[test]
fn test_category_and_descendant_count_once() {
    let categories = budget();
    // camera = 600 + 400 + 500
    let total = with_ctx(|ctx| {
        resolve_base(&ids(&["camera", "p35", "primes"]), &categories, ctx, false).total
    });
    assert_eq!(total, dec!(1500));
}

#[test]
fn test_sibling_selections_add_up() {
    let categories = budget();
    let total = with_ctx(|ctx| {
        resolve_base(&ids(&["p50", "zoom", "gaffer"]), &categories, ctx, false).total
    });
    assert_eq!(total, dec!(400) + dec!(500) + dec!(2250));
}

#[test]
fn test_social_charges_in_base() {
    let categories = budget();
    let base = with_ctx(|ctx| resolve_base(&ids(&["production"]), &categories, ctx, true));
    // 6250 + 4000 * 0.65
    assert_eq!(base.total, dec!(8850));
    assert_eq!(base.breakdown.len(), 1);
    assert_eq!(base.breakdown[0].children.len(), 2);
}

#[test]
fn test_missing_reference_contributes_zero() {
    let categories = budget();
    let base = with_ctx(|ctx| resolve_base(&ids(&["zoom", "deleted"]), &categories, ctx, false));
    assert_eq!(base.total, dec!(500));
    assert_eq!(
        base.diagnostics.into_vec(),
        vec![Diagnostic::UnresolvedReference { id: "deleted".into() }]
    );
}

#[test]
fn test_percentage_line_value() {
    let categories = budget();
    let insurance =
        CostLine::post("insurance", "Insurance").percentage_of(dec!(20), &["production"]);
    let value = with_ctx(|ctx| value_percentage_line(&insurance, &categories, ctx));
    assert_eq!(value.base.total, dec!(6250));
    assert_eq!(value.amount, dec!(1250));
}

#[test]
fn test_percentage_of_percentage_line() {
    let mut categories = budget();
    categories[1].children.push(
        CostLine::post("insurance", "Insurance").percentage_of(dec!(20), &["dop", "gaffer"]),
    );
    let contingency = CostLine::post("contingency", "Contingency")
        .percentage_of(dec!(10), &["insurance", "zoom"]);
    let value = with_ctx(|ctx| value_percentage_line(&contingency, &categories, ctx));
    // (1250 + 500) * 10%
    assert_eq!(value.amount, dec!(175));
    assert!(value.base.diagnostics.is_empty());
}

#[test]
fn test_mutual_percentage_lines_terminate() {
    let categories = vec![Category::new(
        "misc",
        "Misc",
        vec![
            CostLine::post("a", "A").percentage_of(dec!(10), &["b", "fee"]),
            CostLine::post("b", "B").percentage_of(dec!(10), &["a"]),
            CostLine::post("fee", "Fee").priced(dec!(1), dec!(1), dec!(1000)),
        ],
    )];
    let value =
        with_ctx(|ctx| value_percentage_line(&categories[0].children[0], &categories, ctx));
    // a and b select each other, so b adds nothing to a: a = 10% of 1000
    assert_eq!(value.amount, dec!(100));
    assert!(value
        .base
        .diagnostics
        .contains(&Diagnostic::CyclicReference { id: "b".into() }));
}

#[test]
fn test_envelope_carries_fingerprint_and_line_amount() {
    let input = ResolveBaseInput {
        selected_references: ids(&["production"]),
        categories: budget(),
        include_social_charges: false,
        percent: Some(dec!(20)),
        settings: BudgetSettings::default(),
    };
    let out = resolve_percentage_base(&input).unwrap();
    assert_eq!(out.result.total, dec!(6250));
    assert_eq!(out.result.line_amount, Some(dec!(1250)));
    assert_eq!(
        out.result.fingerprint,
        fingerprint(&input.selected_references, &input.categories)
    );
}

#[test]
fn test_envelope_rejects_negative_percent() {
    let input = ResolveBaseInput {
        selected_references: ids(&["production"]),
        categories: budget(),
        include_social_charges: false,
        percent: Some(dec!(-1)),
        settings: BudgetSettings::default(),
    };
    assert!(resolve_percentage_base(&input).is_err());
}

// ===========================================================================
// Fingerprint
// ===========================================================================

#[test]
fn test_fingerprint_tracks_renames_not_amounts() {
    let before = budget();
    let mut repriced = budget();
    repriced[1].children[1].unit_rate = dec!(500);
    let mut renamed = budget();
    renamed[1].children[1].name = "Chief LX".into();

    let sel = ids(&["production"]);
    assert_eq!(fingerprint(&sel, &before), fingerprint(&sel, &repriced));
    assert_ne!(fingerprint(&sel, &before), fingerprint(&sel, &renamed));

    // a rename changes the key but never the value
    let (before_total, renamed_total) = with_ctx(|ctx| {
        (
            resolve_base(&sel, &before, ctx, true).total,
            resolve_base(&sel, &renamed, ctx, true).total,
        )
    });
    assert_eq!(before_total, renamed_total);
    assert_eq!(renamed_total, dec!(8850));
}

// ===========================================================================
// Percentage lines over their own category
// ===========================================================================

#[test]
fn test_many_percentage_lines_in_selected_category_aggregate_quickly() {
    let mut lines = vec![CostLine::post("x", "Props").priced(dec!(1), dec!(1), dec!(1000))];
    for i in 0..12 {
        lines.push(
            CostLine::post(format!("misc-{i}"), format!("Misc fee {i}"))
                .percentage_of(dec!(1), &["misc"]),
        );
    }
    let settings = BudgetSettings::default();
    let categories = vec![Category::new("misc", "Misc", lines)];

    let start = Instant::now();
    let agg = aggregate(&categories, &settings);
    assert!(start.elapsed().as_millis() < 1000);
    // every fee is 1% of the props alone
    assert_eq!(agg.totals.base_cost, dec!(1120));
    assert!(agg
        .diagnostics
        .contains(&Diagnostic::CyclicReference { id: "misc-0".into() }));
}

// ===========================================================================
// Properties
// ===========================================================================

const ALL_IDS: [&str; 10] = [
    "camera", "lenses", "primes", "p35", "p50", "zoom", "production", "dop", "gaffer", "missing",
];

proptest! {
    #[test]
    fn prop_selection_order_does_not_change_total(
        picks in proptest::sample::subsequence(ALL_IDS.to_vec(), 0..ALL_IDS.len()),
        seed in any::<u64>(),
    ) {
        let categories = budget();
        let forward: Vec<String> = picks.iter().map(|s| s.to_string()).collect();
        let mut shuffled = forward.clone();
        // deterministic rotation plus reversal
        let k = if shuffled.is_empty() { 0 } else { (seed as usize) % shuffled.len() };
        shuffled.rotate_left(k);
        shuffled.reverse();

        let (a, b) = with_ctx(|ctx| {
            (
                resolve_base(&forward, &categories, ctx, true).total,
                resolve_base(&shuffled, &categories, ctx, true).total,
            )
        });
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_total_never_exceeds_whole_budget(
        picks in proptest::sample::subsequence(ALL_IDS.to_vec(), 0..ALL_IDS.len()),
    ) {
        let categories = budget();
        let sel: Vec<String> = picks.iter().map(|s| s.to_string()).collect();
        let (total, whole) = with_ctx(|ctx| {
            (
                resolve_base(&sel, &categories, ctx, false).total,
                resolve_base(&ids(&["camera", "production"]), &categories, ctx, false).total,
            )
        });
        prop_assert!(total <= whole);
        prop_assert!(total >= Decimal::ZERO);
    }
}
