// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! Output formatting for firmguardctl
//!
//! Results go to stdout, either as pretty-printed JSON or as a short human
//! readable summary. Progress messages and logs go to stderr so that the
//! JSON output can be piped into other tools.

use crate::error::FirmguardctlError;
use log::info;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Json,
    Text,
}

impl From<crate::OutputFormat> for Format {
    fn from(format: crate::OutputFormat) -> Self {
        match format {
            crate::OutputFormat::Json => Format::Json,
            crate::OutputFormat::Text => Format::Text,
        }
    }
}

#[derive(Debug)]
pub struct OutputHandler {
    format: Format,
    quiet: bool,
}

impl OutputHandler {
    pub fn new(format: crate::OutputFormat, quiet: bool) -> Self {
        Self {
            format: format.into(),
            quiet,
        }
    }

    pub fn success(&self, value: Value) {
        let output = match self.format {
            Format::Json => self.format_json(value),
            Format::Text => self.format_text(value),
        };

        println!("{output}");
    }

    pub fn error(&self, error: FirmguardctlError) {
        match self.format {
            Format::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&error.to_json())
                        .unwrap_or_default()
                );
            }
            Format::Text => eprintln!("Error: {error}"),
        }
    }

    pub fn info<T: AsRef<str>>(&self, message: T) {
        if !self.quiet {
            info!("{}", message.as_ref());
        }
    }

    pub fn progress<T: AsRef<str>>(&self, message: T) {
        if !self.quiet {
            eprintln!("● {}", message.as_ref());
        }
    }

    fn format_json(&self, value: Value) -> String {
        serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| "{}".to_string())
    }

    fn format_text(&self, value: Value) -> String {
        match value {
            Value::Object(ref map) if map.contains_key("risk_level") => {
                self.format_report(&value)
            }
            Value::Object(map) => {
                if map.is_empty() {
                    return "(empty)".to_string();
                }
                map.iter()
                    .map(|(key, value)| {
                        format!("{key}: {}", self.format_value_brief(value))
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            _ => self.format_value_brief(&value),
        }
    }

    fn format_report(&self, report: &Value) -> String {
        let text = |key: &str| {
            report
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string()
        };
        let findings = |key: &str| {
            report
                .get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };

        let threats = findings("threats_detected");
        let modifications = findings("modifications_found");
        let warnings = findings("warnings");
        let action = text("recommended_action");

        let mut lines = vec![
            format!("Risk level: {}", text("risk_level")),
            format!("Recommended action: {action}"),
            format!("Threats detected: {}", threats.len()),
            format!("Modifications found: {}", modifications.len()),
        ];

        for finding in threats.iter().chain(modifications.iter()) {
            let field = |key: &str| {
                finding.get(key).and_then(Value::as_str).unwrap_or_default()
            };
            lines.push(format!(
                "  [{}] {}: {}",
                field("severity"),
                field("type"),
                field("details")
            ));
            if let Some(variables) =
                finding.get("variables").and_then(Value::as_array)
            {
                for variable in variables {
                    lines.push(format!(
                        "      variable: {}",
                        self.format_value_brief(variable)
                    ));
                }
            }
            if let Some(indicators) =
                finding.get("risk_indicators").and_then(Value::as_array)
            {
                let indicators = indicators
                    .iter()
                    .map(|i| self.format_value_brief(i))
                    .collect::<Vec<_>>()
                    .join(", ");
                lines.push(format!("      indicators: {indicators}"));
            }
        }

        if !warnings.is_empty() {
            lines.push(format!("Partial data ({} source(s)):", warnings.len()));
            for warning in &warnings {
                let field = |key: &str| {
                    warning.get(key).and_then(Value::as_str).unwrap_or_default()
                };
                lines.push(format!("  {}: {}", field("source"), field("reason")));
            }
        }

        lines.push(action_hint(&action).to_string());
        lines.join("\n")
    }

    fn format_value_brief(&self, value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => "-".to_string(),
            Value::Array(items) => items
                .iter()
                .map(|item| self.format_value_brief(item))
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
            other => other.to_string(),
        }
    }
}

fn action_hint(action: &str) -> &'static str {
    match action {
        "IMMEDIATE_RECOVERY" => "Restore a known-good image now: firmguardctl flash restore <image> --yes",
        "RECOVERY_RECOMMENDED" => "Back up the flash chip and plan a restore from a known-good image",
        "INVESTIGATE" => "Review the findings above before trusting this system",
        "MONITOR" => "No immediate action needed; scan again after the pending update",
        _ => "No action needed",
    }
}
