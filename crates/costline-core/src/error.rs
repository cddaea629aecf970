use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CostlineError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Invalid target: total {target_total} cannot be reached from base cost {base_cost}")]
    InvalidTarget {
        base_cost: Decimal,
        target_total: Decimal,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CostlineError {
    fn from(e: serde_json::Error) -> Self {
        CostlineError::SerializationError(e.to_string())
    }
}
