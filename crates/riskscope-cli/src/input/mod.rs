pub mod file;
pub mod stdin;

use serde_json::{Map, Value};

/// Pull the feature object out of a `score` input document: either a bare
/// map of feature name to value, or one wrapped in `{"features": {...}}`.
pub fn feature_map(data: Value) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    match data {
        Value::Object(mut map) => match map.remove("features") {
            Some(Value::Object(inner)) => Ok(inner),
            Some(other) => {
                map.insert("features".into(), other);
                Ok(map)
            }
            None => Ok(map),
        },
        _ => Err("feature input must be a JSON object".into()),
    }
}
