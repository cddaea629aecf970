use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::CostlineError;
use crate::types::{with_metadata, ComputationOutput, Diagnostics, Money, Percent};
use crate::valuation::social::total_with_margins;
use crate::CostlineResult;

/// Margin percentage that turns `base_cost` into `target_total`:
/// `(target / base - 1) × 100`.
///
/// Fails with [`CostlineError::InvalidTarget`] when the base is not positive,
/// the target does not exceed it, or the ratio overflows.
pub fn solve_margin_for_target(base_cost: Money, target_total: Money) -> CostlineResult<Percent> {
    let invalid = || CostlineError::InvalidTarget {
        base_cost,
        target_total,
    };
    if base_cost <= Decimal::ZERO || target_total <= base_cost {
        return Err(invalid());
    }
    target_total
        .checked_div(base_cost)
        .and_then(|ratio| ratio.checked_sub(Decimal::ONE))
        .and_then(|growth| growth.checked_mul(dec!(100)))
        .ok_or_else(invalid)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeInput {
    pub base_cost: Money,
    pub target_total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeOutput {
    pub margin_percent: Percent,
    /// `base_cost` grown by the solved margin, rounded to cents.
    pub reproduced_total: Money,
}

pub fn optimize_margin(input: &OptimizeInput) -> CostlineResult<ComputationOutput<OptimizeOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let margin_percent = solve_margin_for_target(input.base_cost, input.target_total)?;
    if margin_percent > dec!(100) {
        warnings.push(format!(
            "Margin of {}% more than doubles the base cost",
            margin_percent.round_dp(2)
        ));
    }
    let reproduced_total =
        total_with_margins(input.base_cost, Decimal::ZERO, margin_percent).round_dp(2);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Margin solved for a target total: (target / base - 1) x 100",
        &serde_json::json!({
            "base_cost": input.base_cost.to_string(),
            "target_total": input.target_total.to_string(),
        }),
        warnings,
        Diagnostics::new(),
        elapsed,
        OptimizeOutput {
            margin_percent,
            reproduced_total,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_approx(actual: Decimal, expected: Decimal, tolerance: Decimal, label: &str) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tolerance,
            "{label}: expected ~{expected}, got {actual} (diff={diff}, tol={tolerance})"
        );
    }

    #[test]
    fn test_solves_simple_margin() {
        assert_eq!(
            solve_margin_for_target(dec!(10000), dec!(12000)).unwrap(),
            dec!(20)
        );
    }

    #[test]
    fn test_repeating_margin() {
        let out = optimize_margin(&OptimizeInput {
            base_cost: dec!(3000),
            target_total: dec!(4000),
        })
        .unwrap();
        assert_approx(out.result.margin_percent, dec!(33.3333), dec!(0.0001), "margin");
        assert_eq!(out.result.reproduced_total, dec!(4000.00));
    }

    #[test]
    fn test_rejects_target_not_above_base() {
        let err = solve_margin_for_target(dec!(10000), dec!(10000)).unwrap_err();
        match err {
            CostlineError::InvalidTarget {
                base_cost,
                target_total,
            } => {
                assert_eq!(base_cost, dec!(10000));
                assert_eq!(target_total, dec!(10000));
            }
            e => panic!("Expected InvalidTarget, got {e:?}"),
        }
        assert!(solve_margin_for_target(dec!(10000), dec!(9000)).is_err());
    }

    #[test]
    fn test_rejects_non_positive_base() {
        assert!(solve_margin_for_target(Decimal::ZERO, dec!(100)).is_err());
        assert!(solve_margin_for_target(dec!(-5), dec!(100)).is_err());
    }

    #[test]
    fn test_overflowing_ratio_is_rejected() {
        let err = solve_margin_for_target(Decimal::new(1, 28), dec!(1000000)).unwrap_err();
        assert!(matches!(err, CostlineError::InvalidTarget { .. }));
        assert!(optimize_margin(&OptimizeInput {
            base_cost: Decimal::new(1, 28),
            target_total: Decimal::MAX,
        })
        .is_err());
    }

    #[test]
    fn test_envelope_reproduces_target() {
        let out = optimize_margin(&OptimizeInput {
            base_cost: dec!(6250),
            target_total: dec!(7187.50),
        })
        .unwrap();
        assert_eq!(out.result.margin_percent, dec!(15));
        assert_eq!(out.result.reproduced_total, dec!(7187.50));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_envelope_warns_on_large_margin() {
        let out = optimize_margin(&OptimizeInput {
            base_cost: dec!(100),
            target_total: dec!(250),
        })
        .unwrap();
        assert_eq!(out.result.margin_percent, dec!(150));
        assert_eq!(out.warnings.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_margin_reproduces_target(
            base_cents in 1i64..100_000_000i64,
            extra_cents in 1i64..100_000_000i64,
        ) {
            let base = Decimal::new(base_cents, 2);
            let target = base + Decimal::new(extra_cents, 2);
            let margin = solve_margin_for_target(base, target).unwrap();
            let back = total_with_margins(base, Decimal::ZERO, margin);
            prop_assert!((back - target).abs() <= dec!(0.01));
        }
    }
}
