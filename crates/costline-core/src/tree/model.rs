use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Money, Percent, Rate};

/// Id of the display-only category that groups social-charge rows.
pub const SOCIAL_CHARGES_CATEGORY_ID: &str = "social-charges";

/// Unit sentinel that turns a line into a percentage line.
pub const PERCENTAGE_UNIT: &str = "percentage";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Position of a line in the fixed four-level hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LineKind {
    Category,
    SubCategory,
    Post,
    SubPost,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineKind::Category => "category",
            LineKind::SubCategory => "subCategory",
            LineKind::Post => "post",
            LineKind::SubPost => "subPost",
        }
    }

    /// Categories and sub-categories group lines; posts carry amounts.
    pub fn is_container(&self) -> bool {
        matches!(self, LineKind::Category | LineKind::SubCategory)
    }
}

/// Display unit of a line. `"percentage"` is parsed into its own variant
/// because it changes how the line is valued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Unit {
    Percentage,
    Label(String),
}

impl Default for Unit {
    fn default() -> Self {
        Unit::Label(String::new())
    }
}

impl From<String> for Unit {
    fn from(s: String) -> Self {
        if s == PERCENTAGE_UNIT {
            Unit::Percentage
        } else {
            Unit::Label(s)
        }
    }
}

impl From<Unit> for String {
    fn from(u: Unit) -> Self {
        match u {
            Unit::Percentage => PERCENTAGE_UNIT.to_string(),
            Unit::Label(s) => s,
        }
    }
}

/// How a distribution amount is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    /// `amount` is a percentage (0–100) of the line's distributable base.
    Percentage,
    /// `amount` is a fixed sum in the line's valuation currency.
    Fixed,
}

// ---------------------------------------------------------------------------
// Tree nodes
// ---------------------------------------------------------------------------

/// Allocation of part of a line to an expense bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub bucket_id: String,
    pub kind: DistributionKind,
    pub amount: Decimal,
}

/// One row of the budget tree: sub-category, post or sub-post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub kind: LineKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<Decimal>,
    /// Price per unit, or the percentage applied to the base for
    /// percentage lines (20 = 20%).
    #[serde(default)]
    pub unit_rate: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_rate: Option<Decimal>,
    #[serde(default)]
    pub overtime_amount: Money,
    #[serde(default)]
    pub unit: Unit,
    /// Currency the rate is quoted in; `None` means the display currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_charge_type_id: Option<String>,
    /// Charge fraction that bypasses the charge-rate table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_charge_rate_override: Option<Rate>,
    /// `None` falls back to the budget-wide default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency_percent: Option<Percent>,
    /// `None` falls back to the budget-wide default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_percent: Option<Percent>,
    /// Nodes whose combined value is the base of a percentage line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_references: Vec<String>,
    #[serde(default)]
    pub include_social_charges_in_base: bool,
    /// Value of a percentage line resolved by the caller beforehand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distributions: Vec<Distribution>,
    #[serde(default)]
    pub include_social_charges_in_distribution: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CostLine>,
}

impl CostLine {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: LineKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            quantity: None,
            count: None,
            unit_rate: Decimal::ZERO,
            alternate_rate: None,
            overtime_amount: Decimal::ZERO,
            unit: Unit::default(),
            currency: None,
            social_charge_type_id: None,
            social_charge_rate_override: None,
            agency_percent: None,
            margin_percent: None,
            selected_references: Vec::new(),
            include_social_charges_in_base: false,
            calculated_amount: None,
            distributions: Vec::new(),
            include_social_charges_in_distribution: false,
            children: Vec::new(),
        }
    }

    pub fn post(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, LineKind::Post)
    }

    pub fn sub_post(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, LineKind::SubPost)
    }

    pub fn sub_category(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, LineKind::SubCategory)
    }

    /// Shorthand for `quantity × count × rate`.
    pub fn priced(mut self, quantity: Decimal, count: Decimal, rate: Decimal) -> Self {
        self.quantity = Some(quantity);
        self.count = Some(count);
        self.unit_rate = rate;
        self
    }

    /// Turn the line into a percentage line of `percent` over `references`.
    pub fn percentage_of(mut self, percent: Percent, references: &[&str]) -> Self {
        self.unit = Unit::Percentage;
        self.unit_rate = percent;
        self.selected_references = references.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_currency(mut self, code: impl Into<String>) -> Self {
        self.currency = Some(code.into());
        self
    }

    pub fn with_charge_type(mut self, type_id: impl Into<String>) -> Self {
        self.social_charge_type_id = Some(type_id.into());
        self
    }

    pub fn with_children(mut self, children: Vec<CostLine>) -> Self {
        self.children = children;
        self
    }

    pub fn is_percentage(&self) -> bool {
        self.unit == Unit::Percentage
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn quantity_or_zero(&self) -> Decimal {
        self.quantity.unwrap_or(Decimal::ZERO)
    }

    pub fn count_or_zero(&self) -> Decimal {
        self.count.unwrap_or(Decimal::ZERO)
    }

    /// Rate used for valuation, honouring alternate-rate mode.
    pub fn effective_rate(&self, use_alternate_rate: bool) -> Decimal {
        match (use_alternate_rate, self.alternate_rate) {
            (true, Some(alt)) => alt,
            _ => self.unit_rate,
        }
    }
}

/// Top-level container of the budget tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Marks the display-only social-charges grouping.
    #[serde(default)]
    pub is_social_charges: bool,
    #[serde(default)]
    pub children: Vec<CostLine>,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>, children: Vec<CostLine>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_social_charges: false,
            children,
        }
    }

    pub fn is_social_charges_group(&self) -> bool {
        self.is_social_charges || self.id == SOCIAL_CHARGES_CATEGORY_ID
    }
}

// ---------------------------------------------------------------------------
// Reference tables
// ---------------------------------------------------------------------------

/// A named social-charge class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRate {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Fraction of the line base (0.65 = 65%).
    pub rate: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency_percent: Option<Percent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_percent: Option<Percent>,
}

impl ChargeRate {
    pub fn new(id: impl Into<String>, label: impl Into<String>, rate: Rate) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            rate,
            agency_percent: None,
            margin_percent: None,
        }
    }
}

/// Secondary grouping used only for distribution reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseBucket {
    pub id: String,
    #[serde(default)]
    pub name: String,
}
