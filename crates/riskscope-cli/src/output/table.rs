use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{collect_headers, format_scalar, is_record_list};

/// Columns shown for feature rows; everything else stays in JSON output.
const FEATURE_COLUMNS: &[&str] = &[
    "name",
    "category",
    "weight",
    "effect",
    "raw_value",
    "entity_score",
    "industry_score",
    "population_score",
];

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else {
                print_flat_object(map);
            }
        }
        Value::Array(arr) => {
            print_array_table(arr, None);
        }
        _ => {
            println!("{}", value);
        }
    }
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    if let Value::Object(res_map) = result {
        // Scalars first, then one table per nested section.
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in res_map {
            if !is_section(val) {
                builder.push_record([key.as_str(), &format_value(val)]);
            }
        }
        println!("{}", Table::from(builder));

        for (key, val) in res_map {
            match val {
                Value::Array(arr) if is_record_list(val) => {
                    println!("\n{}:", key);
                    let columns = (key == "features" || key.starts_with("top_")).then_some(FEATURE_COLUMNS);
                    print_array_table(arr, columns);
                }
                Value::Object(inner) if is_section(val) => {
                    println!("\n{}:", key);
                    print_keyed_table(inner);
                }
                _ => {}
            }
        }
    } else {
        print_flat_object(envelope);
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// A record list, or a map whose values are all objects (e.g. category verdicts).
fn is_section(value: &Value) -> bool {
    match value {
        Value::Array(_) => is_record_list(value),
        Value::Object(map) => !map.is_empty() && map.values().all(Value::is_object),
        _ => false,
    }
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_keyed_table(map: &Map<String, Value>) {
    let headers = collect_headers(map.values());
    let mut builder = Builder::default();
    let mut header_row = vec!["key".to_string()];
    header_row.extend(headers.iter().cloned());
    builder.push_record(header_row);

    for (key, row) in map {
        if let Value::Object(fields) = row {
            let mut record = vec![key.clone()];
            record.extend(
                headers
                    .iter()
                    .map(|h| fields.get(h).map(format_value).unwrap_or_default()),
            );
            builder.push_record(record);
        }
    }
    println!("{}", Table::from(builder));
}

fn print_array_table(arr: &[Value], columns: Option<&[&str]>) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if matches!(arr.first(), Some(Value::Object(_))) {
        let headers: Vec<String> = match columns {
            Some(cols) => cols.iter().map(|c| c.to_string()).collect(),
            None => collect_headers(arr),
        };
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
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
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        other => format_scalar(other),
    }
}
