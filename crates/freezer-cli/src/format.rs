//! Output formatting for freezerctl
//!
//! Human-readable text by default, one JSON object per result with `--json`.
//! Everything goes to stdout; logs go to stderr.

use anyhow::Result;
use serde_json::Value;

pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print a result as `key: value` lines or as one JSON object.
    pub fn print_fields(&self, title: &str, fields: &[(&str, Value)]) -> Result<()> {
        if self.json {
            let object: serde_json::Map<String, Value> = fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            println!("{}", serde_json::to_string(&Value::Object(object))?);
            return Ok(());
        }

        println!("{title}");
        for (key, value) in fields {
            match value {
                Value::String(s) => println!("  {key}: {s}"),
                Value::Null => println!("  {key}: -"),
                other => println!("  {key}: {other}"),
            }
        }
        Ok(())
    }

    /// Print a success message (text mode only)
    pub fn print_success(&self, message: &str) {
        if !self.json {
            println!("✅ {}", message);
        }
    }
}
