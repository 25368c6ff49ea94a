use serde_json::{Map, Value};
use std::io::{self, Read};

/// Feature object piped into `riskscope score`. An interactive terminal or
/// blank input means nothing was piped.
pub fn read_piped_features() -> Result<Option<Map<String, Value>>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().lock().read_to_string(&mut buffer)?;
    parse_piped(&buffer)
}

fn parse_piped(text: &str) -> Result<Option<Map<String, Value>>, Box<dyn std::error::Error>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let data: Value =
        serde_json::from_str(text).map_err(|e| format!("stdin is not a JSON feature object: {}", e))?;
    super::feature_map(data).map(Some)
}
