//! Simple Output and Reporting
//!
//! This module provides output formatting for validation results.

use serde::Serialize;
use std::time::Duration;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::diagnostics::{ValidationError, ValidationResult};
use crate::registry::MessageType;

/// One validation call as printed by the CLI.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub message_type: &'a str,
    pub source: &'a str,
    pub duration_ms: u64,
    pub result: &'a ValidationResult,
}

/// Output formatter for validation results
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        Self::with_colors(verbosity, format, atty::is(atty::Stream::Stdout))
    }

    pub fn with_colors(verbosity: VerbosityLevel, format: OutputFormat, show_colors: bool) -> Self {
        Self {
            verbosity,
            format,
            show_colors,
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_report(&self, report: &Report<'_>) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).unwrap_or_else(|e| {
                    format!("{{\"error\": \"failed to serialize report: {}\"}}", e)
                }) + "\n"
            }
            OutputFormat::Human => self.format_human(report),
        }
    }

    fn format_human(&self, report: &Report<'_>) -> String {
        let result = report.result;
        let mut output = String::new();

        let status = if result.is_success() {
            self.colorize("✓ VALID", "32")
        } else if result.is_internal_error() {
            self.colorize("⚠ ERROR", "33")
        } else if result.is_unrecognised() {
            self.colorize("? UNRECOGNISED", "36")
        } else {
            self.colorize("✗ INVALID", "31")
        };

        output.push_str(&format!("{}  {} [{}]", status, report.source, report.message_type));
        if self.verbosity >= VerbosityLevel::Verbose {
            output.push_str(&format!(
                " ({})",
                format_duration(Duration::from_millis(report.duration_ms))
            ));
        }

        let errors = result.errors();
        if errors.iter().any(ValidationError::is_content_violation) {
            output.push_str(&format!(
                " - {} error{}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
        }
        output.push('\n');

        if self.verbosity > VerbosityLevel::Quiet {
            for error in errors {
                output.push_str(&format!("    {}\n", error));
            }
        }

        output
    }

    pub fn format_message_types(&self, message_types: &[MessageType]) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(message_types).unwrap_or_default() + "\n"
            }
            OutputFormat::Human => {
                let mut output = String::new();
                output.push_str("Registered message types:\n");
                for mt in message_types {
                    output.push_str(&format!(
                        "  {:<12} {:<5} {:<8} {}\n",
                        mt.code, mt.kind, mt.root_element, mt.schema_path
                    ));
                }
                output
            }
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MessageTypeRegistry;

    fn invalid() -> ValidationResult {
        ValidationResult::from_errors(vec![
            ValidationError::SchemaViolation {
                line: Some(12),
                column: Some(5),
                message: "Element 'countryOfDispatch': This element is not expected.".to_string(),
            },
            ValidationError::SchemaViolation {
                line: Some(8),
                column: None,
                message: "Missing child element(s).".to_string(),
            },
        ])
    }

    fn report<'a>(result: &'a ValidationResult) -> Report<'a> {
        Report {
            message_type: "IE015",
            source: "body.xml",
            duration_ms: 1500,
            result,
        }
    }

    #[test]
    fn test_human_invalid_lists_every_error() {
        let output = Output::with_colors(VerbosityLevel::Normal, OutputFormat::Human, false);
        let result = invalid();
        let text = output.format_report(&report(&result));

        assert!(text.starts_with("✗ INVALID  body.xml [IE015] - 2 errors\n"));
        assert!(text.contains("    12:5: Element 'countryOfDispatch'"));
        assert!(text.contains("    8: Missing child element(s)."));
    }

    #[test]
    fn test_quiet_prints_outcome_only() {
        let output = Output::with_colors(VerbosityLevel::Quiet, OutputFormat::Human, false);
        let result = invalid();
        let text = output.format_report(&report(&result));
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_verbose_shows_duration_and_colors() {
        let output = Output::with_colors(VerbosityLevel::Verbose, OutputFormat::Human, true);
        let result = ValidationResult::Success;
        let text = output.format_report(&report(&result));
        assert!(text.contains("\x1b[32m✓ VALID\x1b[0m"));
        assert!(text.contains("(1.50s)"));
    }

    #[test]
    fn test_internal_error_label() {
        let output = Output::with_colors(VerbosityLevel::Normal, OutputFormat::Human, false);
        let result = ValidationResult::from_errors(vec![ValidationError::InternalServiceError {
            cause: "timed out".to_string(),
        }]);
        let text = output.format_report(&report(&result));
        assert!(text.starts_with("⚠ ERROR"));
        assert!(!text.contains(" - 1 error"));
    }

    #[test]
    fn test_json_report() {
        let output = Output::with_colors(VerbosityLevel::Normal, OutputFormat::Json, true);
        let result = invalid();
        let text = output.format_report(&report(&result));

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["message_type"], "IE015");
        assert_eq!(value["result"]["result"], "failure");
        assert_eq!(value["result"]["errors"][0]["type"], "SchemaViolation");
        assert_eq!(value["result"]["errors"][0]["line"], 12);
        assert!(!text.contains("\x1b["));
    }

    #[test]
    fn test_message_type_listing() {
        let output = Output::with_colors(VerbosityLevel::Normal, OutputFormat::Human, false);
        let text = output.format_message_types(MessageTypeRegistry::global().message_types());
        assert!(text.contains("IE015-JSON"));
        assert!(text.contains("xsd/cc015c.xsd"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30.0s");
    }
}
