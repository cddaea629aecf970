use serde_json::{Map, Value};
use std::io;

/// Write output as CSV to stdout.
///
/// Results become two-column `field,value` rows. Nested records are
/// flattened with dotted, indexed paths (`buckets.0.amount`) so one file
/// holds the whole result.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let root = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let _ = wtr.write_record(["field", "value"]);
    let mut rows = Vec::new();
    match root {
        Value::Object(map) => flatten_object("", map, &mut rows),
        other => rows.push((String::new(), format_csv_value(other))),
    }
    for (field, val) in rows {
        let _ = wtr.write_record([field.as_str(), val.as_str()]);
    }

    let _ = wtr.flush();
}

fn flatten_object(prefix: &str, map: &Map<String, Value>, rows: &mut Vec<(String, String)>) {
    for (key, val) in map {
        flatten(&join(prefix, key), val, rows);
    }
}

fn flatten(path: &str, value: &Value, rows: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => flatten_object(path, map, rows),
        Value::Array(arr) if arr.iter().any(|v| v.is_object() || v.is_array()) => {
            for (i, item) in arr.iter().enumerate() {
                flatten(&join(path, &i.to_string()), item, rows);
            }
        }
        _ => rows.push((path.to_string(), format_csv_value(value))),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => arr.iter().map(format_csv_value).collect::<Vec<_>>().join(";"),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
