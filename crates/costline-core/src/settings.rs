use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::RateTable;
use crate::error::CostlineError;
use crate::tree::ChargeRate;
use crate::types::Percent;
use crate::valuation::ValuationContext;
use crate::CostlineResult;

pub const DEFAULT_DISPLAY_CURRENCY: &str = "EUR";

fn default_display_currency() -> String {
    DEFAULT_DISPLAY_CURRENCY.to_string()
}

/// Budget-wide settings threaded explicitly through every computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSettings {
    #[serde(default = "default_display_currency")]
    pub display_currency: String,
    #[serde(default)]
    pub default_agency_percent: Percent,
    #[serde(default)]
    pub default_margin_percent: Percent,
    #[serde(default)]
    pub rates: RateTable,
    #[serde(default)]
    pub charge_rates: Vec<ChargeRate>,
    #[serde(default)]
    pub use_alternate_rate: bool,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            display_currency: default_display_currency(),
            default_agency_percent: Decimal::ZERO,
            default_margin_percent: Decimal::ZERO,
            rates: RateTable::default(),
            charge_rates: Vec::new(),
            use_alternate_rate: false,
        }
    }
}

impl BudgetSettings {
    pub fn validate(&self) -> CostlineResult<()> {
        if self.display_currency.trim().is_empty() {
            return Err(CostlineError::InvalidInput {
                field: "display_currency".into(),
                reason: "Display currency must not be empty".into(),
            });
        }
        if self.default_agency_percent < Decimal::ZERO {
            return Err(CostlineError::InvalidInput {
                field: "default_agency_percent".into(),
                reason: "Default agency percentage cannot be negative".into(),
            });
        }
        if self.default_margin_percent < Decimal::ZERO {
            return Err(CostlineError::InvalidInput {
                field: "default_margin_percent".into(),
                reason: "Default margin percentage cannot be negative".into(),
            });
        }
        for rate in &self.charge_rates {
            if rate.rate < Decimal::ZERO {
                return Err(CostlineError::InvalidInput {
                    field: format!("charge_rates.{}", rate.id),
                    reason: "Charge rate cannot be negative".into(),
                });
            }
        }
        Ok(())
    }

    pub fn context(&self) -> ValuationContext<'_> {
        ValuationContext {
            target_currency: &self.display_currency,
            rates: &self.rates,
            charge_rates: &self.charge_rates,
            use_alternate_rate: self.use_alternate_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let settings: BudgetSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, BudgetSettings::default());
        assert_eq!(settings.display_currency, "EUR");
    }

    #[test]
    fn test_negative_default_margin_rejected() {
        let settings = BudgetSettings {
            default_margin_percent: dec!(-1),
            ..Default::default()
        };
        match settings.validate().unwrap_err() {
            CostlineError::InvalidInput { field, .. } => {
                assert_eq!(field, "default_margin_percent")
            }
            e => panic!("Expected InvalidInput, got {e:?}"),
        }
    }

    #[test]
    fn test_negative_charge_rate_rejected() {
        let settings = BudgetSettings {
            charge_rates: vec![ChargeRate::new("techs", "Technicians", dec!(-0.1))],
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
