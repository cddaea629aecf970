pub mod file;
pub mod stdin;

use costline_core::BudgetSettings;
use serde::de::DeserializeOwned;

/// Load a command's input from `--input`, falling back to piped stdin.
pub fn load<T: DeserializeOwned>(
    path: Option<&str>,
    command: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return file::read_document(path);
    }
    if let Some(data) = stdin::read_stdin()? {
        return Ok(serde_json::from_value(data)?);
    }
    Err(format!("--input file (or JSON on stdin) is required for {command}").into())
}

/// Settings from `--settings`, validated. `None` when no file was given.
pub fn load_settings(
    path: Option<&str>,
) -> Result<Option<BudgetSettings>, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let settings: BudgetSettings = file::read_document(path)?;
    settings.validate()?;
    tracing::debug!(
        currency = %settings.display_currency,
        rates = settings.rates.codes().count(),
        charge_rates = settings.charge_rates.len(),
        "settings loaded"
    );
    Ok(Some(settings))
}
