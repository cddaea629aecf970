use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Format output as tables using the tabled crate.
///
/// Scalar result fields go into one Field/Value table; every list of
/// records in the result (buckets, categories, charges by type, lines) gets
/// its own table underneath.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_tables(result, map);
            } else {
                print_field_table(map);
            }
        }
        Value::Array(arr) => print_record_table(arr),
        _ => println!("{}", value),
    }
}

fn print_result_tables(result: &Value, envelope: &Map<String, Value>) {
    let Value::Object(res_map) = result else {
        print_field_table(envelope);
        return;
    };

    let (records, scalars): (Vec<_>, Vec<_>) = res_map
        .iter()
        .partition(|(_, v)| is_record_list(v));

    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in scalars {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));

    for (key, val) in records {
        if let Value::Array(arr) = val {
            println!("\n{}:", title(key));
            print_record_table(arr);
        }
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn is_record_list(value: &Value) -> bool {
    matches!(value, Value::Array(arr) if arr.first().is_some_and(Value::is_object))
}

fn title(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn print_field_table(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_record_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for map in arr.iter().filter_map(Value::as_object) {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                .collect();
            builder.push_record(row);
        }

        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
