use rust_decimal::prelude::RoundingStrategy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::error::CostlineError;
use crate::types::{with_metadata, ComputationOutput, Diagnostic, Diagnostics, Money};
use crate::CostlineResult;

/// Decimal places every converted amount is rounded to.
pub const CONVERSION_DP: u32 = 2;

// ---------------------------------------------------------------------------
// Rate table
// ---------------------------------------------------------------------------

/// Exchange rates keyed by currency code, each expressed relative to one
/// fixed base currency (the base itself carries a rate of 1).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateTable(BTreeMap<String, Decimal>);

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for fixtures and settings defaults.
    pub fn with_rate(mut self, code: impl Into<String>, rate: Decimal) -> Self {
        self.0.insert(code.into(), rate);
        self
    }

    pub fn insert(&mut self, code: impl Into<String>, rate: Decimal) {
        self.0.insert(code.into(), rate);
    }

    /// Usable rate for `code`. Zero or negative rates count as missing.
    pub fn get(&self, code: &str) -> Option<Decimal> {
        self.0.get(code).copied().filter(|r| *r > Decimal::ZERO)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The currency quoted at exactly 1, if the table has one.
    pub fn base_currency(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, rate)| **rate == Decimal::ONE)
            .map(|(code, _)| code.as_str())
    }
}

impl FromIterator<(String, Decimal)> for RateTable {
    fn from_iter<I: IntoIterator<Item = (String, Decimal)>>(iter: I) -> Self {
        RateTable(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Function 1: convert
// ---------------------------------------------------------------------------

/// Outcome of a single conversion. `diagnostic` is set when the amount had
/// to be passed through unconverted.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub amount: Money,
    pub diagnostic: Option<Diagnostic>,
}

impl Conversion {
    fn exact(amount: Money) -> Self {
        Self {
            amount,
            diagnostic: None,
        }
    }
}

/// Convert `amount` from one currency to another through the common base:
/// `amount / rate[from] * rate[to]`, rounded half-up to two decimals.
///
/// Identical codes return the amount untouched. A code missing from the
/// table fails soft: the original amount comes back together with an
/// `UnknownCurrency` diagnostic.
pub fn convert(amount: Money, from: &str, to: &str, rates: &RateTable) -> Conversion {
    if from == to {
        return Conversion::exact(amount);
    }

    let from_rate = match rates.get(from) {
        Some(r) => r,
        None => return unknown(amount, from),
    };
    let to_rate = match rates.get(to) {
        Some(r) => r,
        None => return unknown(amount, to),
    };

    let converted = (amount / from_rate * to_rate)
        .round_dp_with_strategy(CONVERSION_DP, RoundingStrategy::MidpointAwayFromZero);
    Conversion::exact(converted)
}

fn unknown(amount: Money, code: &str) -> Conversion {
    tracing::debug!(currency = code, "currency missing from rate table");
    Conversion {
        amount,
        diagnostic: Some(Diagnostic::UnknownCurrency {
            code: code.to_string(),
        }),
    }
}

/// Convert from an optional line currency. `None` means the amount is
/// already in the target currency.
pub fn convert_from(
    amount: Money,
    from: Option<&str>,
    to: &str,
    rates: &RateTable,
    diagnostics: &mut Diagnostics,
) -> Money {
    match from {
        Some(code) => {
            let c = convert(amount, code, to, rates);
            if let Some(d) = c.diagnostic {
                diagnostics.push(d);
            }
            c.amount
        }
        None => amount,
    }
}

// ---------------------------------------------------------------------------
// Function 2: convert_amount (envelope)
// ---------------------------------------------------------------------------

/// Input for a standalone conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertInput {
    pub amount: Money,
    pub from: String,
    pub to: String,
    pub rates: RateTable,
}

/// Output of a standalone conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertOutput {
    pub amount: Money,
    pub currency: String,
    /// False when the amount was passed through because a code was unknown.
    pub converted: bool,
}

pub fn convert_amount(input: &ConvertInput) -> CostlineResult<ComputationOutput<ConvertOutput>> {
    let start = Instant::now();

    if input.from.trim().is_empty() {
        return Err(CostlineError::InvalidInput {
            field: "from".into(),
            reason: "Source currency code must not be empty".into(),
        });
    }
    if input.to.trim().is_empty() {
        return Err(CostlineError::InvalidInput {
            field: "to".into(),
            reason: "Target currency code must not be empty".into(),
        });
    }

    let conversion = convert(input.amount, &input.from, &input.to, &input.rates);
    let converted = conversion.diagnostic.is_none();
    let currency = if converted {
        input.to.clone()
    } else {
        input.from.clone()
    };

    let output = ConvertOutput {
        amount: conversion.amount,
        currency,
        converted,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Currency conversion through a common base rate (half-up, 2 dp)",
        &serde_json::json!({
            "amount": input.amount.to_string(),
            "from": input.from,
            "to": input.to,
        }),
        Vec::new(),
        conversion.diagnostic.into(),
        elapsed,
        output,
    ))
}
