use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Document formats accepted for `--input` and `--settings` files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => Format::Yaml,
            _ => Format::Json,
        }
    }
}

/// Read a JSON or YAML file (chosen by extension) into a typed struct.
pub fn read_document<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    tracing::debug!(path = %canonical.display(), bytes = contents.len(), "input file read");
    parse(&contents, Format::from_path(&canonical))
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e).into())
}

fn parse<T: DeserializeOwned>(contents: &str, format: Format) -> Result<T, String> {
    match format {
        Format::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
    }
}

/// Resolve and validate the path, preventing directory traversal.
fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }

    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }

    Ok(canonical)
}
