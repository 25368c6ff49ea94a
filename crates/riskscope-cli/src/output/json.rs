use serde_json::Value;
use std::io::{self, Write};

/// The result envelope as indented JSON, newline-terminated.
pub fn write_json<W: Write>(mut out: W, value: &Value) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)
}

pub fn print_json(value: &Value) {
    if let Err(e) = write_json(io::stdout().lock(), value) {
        eprintln!("JSON output error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_is_indented_and_terminated() {
        let mut buf = Vec::new();
        write_json(&mut buf, &json!({"result": {"risk_score": 12}})).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.contains("\n  \"result\""));
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back["result"]["risk_score"], 12);
    }
}
