//! Report Rendering
//!
//! Turns a [`ValidationReport`] into either a human-readable summary or JSON.

use std::time::Duration;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::diagnostics::{Severity, StageOutcome};
use crate::error::Result;
use crate::pipeline::{StageReport, ValidationReport};

/// Formats validation reports for the terminal
pub struct Output {
    verbosity: VerbosityLevel,
    format: OutputFormat,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel, format: OutputFormat) -> Self {
        Self {
            verbosity,
            format,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    /// Force colors on or off regardless of the terminal
    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn render(&self, report: &ValidationReport) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(self.format_report(report)),
            OutputFormat::Json => self.format_json(report),
        }
    }

    pub fn format_json(&self, report: &ValidationReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    pub fn format_report(&self, report: &ValidationReport) -> String {
        let mut output = String::new();

        if let Some(path) = &report.archive {
            output.push_str(&format!("Archive: {}\n", path.display()));
        }

        if self.verbosity > VerbosityLevel::Quiet {
            for stage in &report.stages {
                output.push_str(&self.format_stage(stage));
                output.push('\n');
            }
        }

        let min = self.verbosity.min_severity();
        let shown: Vec<_> = report.diagnostics_at_least(min).collect();
        if !shown.is_empty() {
            output.push('\n');
            for diagnostic in shown {
                output.push_str(&format!(
                    "{} [{}] {}\n",
                    self.severity_label(diagnostic.severity),
                    diagnostic.stage,
                    diagnostic.message
                ));
            }
        }

        output.push('\n');
        output.push_str(&self.format_summary(report));
        output.push('\n');
        output
    }

    pub fn format_stage(&self, stage: &StageReport) -> String {
        match &stage.outcome {
            StageOutcome::Passed => {
                format!("{}  {}", self.colorize("✓ PASSED", "32"), stage.stage.title())
            }
            StageOutcome::Failed { reason } => format!(
                "{}  {} - {}",
                self.colorize("✗ FAILED", "31"),
                stage.stage.title(),
                reason
            ),
        }
    }

    fn severity_label(&self, severity: Severity) -> String {
        let color = match severity {
            Severity::Info => "36",
            Severity::Success => "32",
            Severity::Warning => "33",
            Severity::Failure => "31",
        };
        self.colorize(severity.label(), color)
    }

    fn format_summary(&self, report: &ValidationReport) -> String {
        let verdict = if report.is_valid() {
            self.colorize("VALID", "32")
        } else {
            self.colorize("INVALID", "31")
        };
        let mut summary = format!(
            "Result: {} ({}/{} stages passed",
            verdict,
            report.stages.len() - report.failed_stages(),
            report.stages.len()
        );

        let warnings = report
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();
        if warnings > 0 {
            summary.push_str(&format!(", {} warning{}", warnings, plural(warnings)));
        }
        summary.push_str(&format!(", {})", format_duration(report.duration)));

        if self.verbosity == VerbosityLevel::Debug {
            summary.push_str(&format!("\nStarted: {}", report.started_at.to_rfc3339()));
        }
        summary
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
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
