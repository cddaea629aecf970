pub mod currency;
pub mod error;
pub mod settings;
pub mod tree;
pub mod types;
pub mod valuation;

pub use error::CostlineError;
pub use settings::BudgetSettings;
pub use types::*;

/// Standard result type for all costline operations
pub type CostlineResult<T> = Result<T, CostlineError>;
