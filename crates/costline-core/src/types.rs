use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.65 = 65%). Used for social-charge fractions.
pub type Rate = Decimal;

/// Percentages expressed as whole numbers (10 = 10%). Used for agency,
/// margin, distribution and percentage-line rates.
pub type Percent = Decimal;

/// Non-fatal condition raised while valuing a budget.
///
/// None of these abort a computation; they travel next to the numeric
/// result so a caller can warn without losing the totals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("Unknown currency '{code}': amount left unconverted")]
    UnknownCurrency { code: String },

    #[error("Unresolved reference '{id}' contributes zero")]
    UnresolvedReference { id: String },

    #[error("Cyclic reference through '{id}' truncated to zero")]
    CyclicReference { id: String },
}

/// Ordered, de-duplicated collection of [`Diagnostic`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a condition once; repeats of the same condition are dropped.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if !self.0.contains(&diagnostic) {
            self.0.push(diagnostic);
        }
    }

    pub fn extend(&mut self, other: Diagnostics) {
        for d in other.0 {
            self.push(d);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn contains(&self, diagnostic: &Diagnostic) -> bool {
        self.0.contains(diagnostic)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl From<Option<Diagnostic>> for Diagnostics {
    fn from(d: Option<Diagnostic>) -> Self {
        let mut out = Diagnostics::new();
        if let Some(d) = d {
            out.push(d);
        }
        out
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata.
///
/// Diagnostics are rendered into `warnings` after any explicit warnings and
/// kept in structured form under `diagnostics`.
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    mut warnings: Vec<String>,
    diagnostics: Diagnostics,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    warnings.extend(diagnostics.iter().map(|d| d.to_string()));
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        diagnostics: diagnostics.into_vec(),
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
