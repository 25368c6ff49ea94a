use serde_json::{Map, Value};
use std::io;

use super::{collect_headers, format_scalar, is_record_list};

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout.
///
/// Record lists inside the result (report features, factor subsets,
/// contributions) become rows with a leading `section` column; a result
/// without any becomes a two-column field/value listing.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => {
            let result = match map.get("result") {
                Some(Value::Object(result)) => result,
                _ => map,
            };
            if result.values().any(is_record_list) {
                write_sections(&mut wtr, result);
            } else {
                write_fields(&mut wtr, result);
            }
        }
        Value::Array(arr) => write_rows(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&format_scalar(value)]);
        }
    }

    let _ = wtr.flush();
}

fn write_fields(wtr: &mut StdoutWriter<'_>, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_scalar(val)]);
    }
}

fn write_sections(wtr: &mut StdoutWriter<'_>, result: &Map<String, Value>) {
    let sections: Vec<(&str, &Vec<Value>)> = result
        .iter()
        .filter_map(|(k, v)| match v {
            Value::Array(arr) if is_record_list(v) => Some((k.as_str(), arr)),
            _ => None,
        })
        .collect();

    let headers = collect_headers(sections.iter().flat_map(|(_, rows)| rows.iter()));
    let mut header_row = vec!["section".to_string()];
    header_row.extend(headers.iter().cloned());
    let _ = wtr.write_record(&header_row);

    for (section, rows) in sections {
        for row in rows {
            if let Value::Object(map) = row {
                let mut record = vec![section.to_string()];
                record.extend(
                    headers
                        .iter()
                        .map(|h| map.get(h).map(format_scalar).unwrap_or_default()),
                );
                let _ = wtr.write_record(&record);
            }
        }
    }
}

fn write_rows(wtr: &mut StdoutWriter<'_>, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }
    if !matches!(arr.first(), Some(Value::Object(_))) {
        for item in arr {
            let _ = wtr.write_record([&format_scalar(item)]);
        }
        return;
    }

    let headers = collect_headers(arr);
    let _ = wtr.write_record(&headers);
    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = headers
                .iter()
                .map(|h| map.get(h).map(format_scalar).unwrap_or_default())
                .collect();
            let _ = wtr.write_record(&row);
        }
    }
}
