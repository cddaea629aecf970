use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use costline_core::settings::BudgetSettings;
use costline_core::tree::Category;
use costline_core::valuation::cache::BaseCache;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

#[napi]
pub fn convert_amount(input_json: String) -> NapiResult<String> {
    let input: costline_core::currency::ConvertInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = costline_core::currency::convert_amount(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Lines and percentage bases
// ---------------------------------------------------------------------------

#[napi]
pub fn value_line(input_json: String) -> NapiResult<String> {
    let input: costline_core::valuation::line::LineValuationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = costline_core::valuation::line::value_line(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn resolve_percentage_base(input_json: String) -> NapiResult<String> {
    let input: costline_core::valuation::percentage::ResolveBaseInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = costline_core::valuation::percentage::resolve_percentage_base(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[derive(Deserialize)]
struct SelectionInput {
    selected_references: Vec<String>,
    categories: Vec<Category>,
    #[serde(default)]
    include_social_charges: bool,
    #[serde(default)]
    settings: BudgetSettings,
}

#[napi]
pub fn selection_fingerprint(input_json: String) -> NapiResult<String> {
    let input: SelectionInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    Ok(costline_core::valuation::fingerprint::fingerprint(
        &input.selected_references,
        &input.categories,
    ))
}

/// Percentage-base memo shared across calls from the host.
///
/// The host bumps `revision` whenever amounts or rates change. Structural
/// edits, including re-pointed percentage lines, change the fingerprint and
/// miss on their own.
#[napi]
pub struct PercentageBaseCache {
    inner: BaseCache,
}

#[napi]
impl PercentageBaseCache {
    #[napi(constructor)]
    pub fn new() -> Self {
        Self {
            inner: BaseCache::new(),
        }
    }

    #[napi]
    pub fn resolve(&self, revision: u32, input_json: String) -> NapiResult<String> {
        let input: SelectionInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
        input.settings.validate().map_err(to_napi_error)?;
        let resolved = self.inner.get_or_resolve(
            u64::from(revision),
            &input.selected_references,
            &input.categories,
            &input.settings.context(),
            input.include_social_charges,
        );
        serde_json::to_string(&resolved).map_err(to_napi_error)
    }

    /// Drop entries computed for older revisions.
    #[napi]
    pub fn prune(&self, revision: u32) {
        self.inner.retain_revision(u64::from(revision));
    }

    #[napi]
    pub fn clear(&self) {
        self.inner.clear();
    }

    #[napi(getter)]
    pub fn size(&self) -> u32 {
        u32::try_from(self.inner.len()).unwrap_or(u32::MAX)
    }
}

impl Default for PercentageBaseCache {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

#[napi]
pub fn aggregate_budget(input_json: String) -> NapiResult<String> {
    let input: costline_core::valuation::aggregate::AggregateInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        costline_core::valuation::aggregate::aggregate_budget(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn distribution_report(input_json: String) -> NapiResult<String> {
    let input: costline_core::valuation::distribution::DistributionInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = costline_core::valuation::distribution::distribution_report(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn optimize_margin(input_json: String) -> NapiResult<String> {
    let input: costline_core::valuation::optimizer::OptimizeInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        costline_core::valuation::optimizer::optimize_margin(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
