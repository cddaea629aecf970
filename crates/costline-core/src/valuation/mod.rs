pub mod aggregate;
pub mod fingerprint;
pub mod line;
pub mod percentage;
pub mod social;

#[cfg(feature = "cache")]
pub mod cache;

#[cfg(feature = "distribution")]
pub mod distribution;

#[cfg(feature = "optimizer")]
pub mod optimizer;

use crate::currency::RateTable;
use crate::tree::ChargeRate;

/// Everything a valuation needs besides the tree itself.
#[derive(Debug, Clone, Copy)]
pub struct ValuationContext<'a> {
    pub target_currency: &'a str,
    pub rates: &'a RateTable,
    pub charge_rates: &'a [ChargeRate],
    pub use_alternate_rate: bool,
}
