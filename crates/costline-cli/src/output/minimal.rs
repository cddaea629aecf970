use serde_json::Value;

/// Key output fields, most specific first.
const PRIORITY_KEYS: [&str; 7] = [
    "grand_total",
    "margin_percent",
    "line_amount",
    "distributed_total",
    "fingerprint",
    "total",
    "amount",
];

/// Print just the key answer value from the output.
///
/// Heuristic: look for well-known result fields in order of priority,
/// then fall back to the first field in the result object.
pub fn print_minimal(value: &Value) {
    println!("{}", minimal_line(value));
}

fn minimal_line(value: &Value) -> String {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Object(map) = result_obj {
        for key in &PRIORITY_KEYS {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    return format_minimal(val);
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            return format!("{}: {}", key, format_minimal(val));
        }
    }

    format_minimal(result_obj)
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_budget_total_wins() {
        let v = json!({ "result": { "base_cost": "6250", "grand_total": "11062.5" } });
        assert_eq!(minimal_line(&v), "11062.5");
    }

    #[test]
    fn test_line_amount_preferred_over_total() {
        let v = json!({ "result": { "total": "6250", "line_amount": "1250" } });
        assert_eq!(minimal_line(&v), "1250");
    }

    #[test]
    fn test_falls_back_to_first_field() {
        let v = json!({ "result": { "currency": "EUR" } });
        assert_eq!(minimal_line(&v), "currency: EUR");
    }
}
