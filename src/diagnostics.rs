//! Diagnostic events and stage outcomes
//!
//! Every stage records what it checked as a [`Diagnostic`] and returns a
//! [`StageOutcome`]. Severity is data carried on the event; rendering and
//! filtering belong to the caller (see [`crate::output`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity tier of a diagnostic, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational detail about a passing check
    Info,
    /// A check passed
    Success,
    /// A check found a problem that is not fatal on its own
    Warning,
    /// A check failed
    Failure,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Success => "SUCCESS",
            Severity::Warning => "WARNING",
            Severity::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Archive,
    Descriptor,
    CoreData,
    Metadata,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Archive,
        Stage::Descriptor,
        Stage::CoreData,
        Stage::Metadata,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Archive => "archive",
            Stage::Descriptor => "descriptor",
            Stage::CoreData => "core-data",
            Stage::Metadata => "metadata",
        }
    }

    /// Human-readable description used in stage summaries
    pub fn title(&self) -> &'static str {
        match self {
            Stage::Archive => "DwC-A archive structure",
            Stage::Descriptor => "meta.xml descriptor",
            Stage::CoreData => "core data file",
            Stage::Metadata => "EML metadata file",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single recorded validation event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
}

/// Result of running one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StageOutcome {
    Passed,
    Failed { reason: String },
}

impl StageOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        StageOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, StageOutcome::Passed)
    }

    /// Keep the first failure; a passed outcome takes `other`
    pub fn and(self, other: StageOutcome) -> StageOutcome {
        match self {
            StageOutcome::Passed => other,
            failed => failed,
        }
    }
}

/// Ordered collector of diagnostics for one pipeline run
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    events: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: Stage, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(stage = %stage, severity = %severity, "{}", message);
        self.events.push(Diagnostic {
            stage,
            severity,
            message,
        });
    }

    pub fn info(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(stage, Severity::Info, message);
    }

    pub fn success(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(stage, Severity::Success, message);
    }

    pub fn warning(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(stage, Severity::Warning, message);
    }

    /// Record a failure and hand back the matching failed outcome
    pub fn failure(&mut self, stage: Stage, message: impl Into<String>) -> StageOutcome {
        let message = message.into();
        self.record(stage, Severity::Failure, message.clone());
        StageOutcome::failed(message)
    }

    pub fn events(&self) -> &[Diagnostic] {
        &self.events
    }

    pub fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &Diagnostic> {
        self.events.iter().filter(move |d| d.stage == stage)
    }

    /// Diagnostics at or above `min`, in recording order
    pub fn at_least(&self, min: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.events.iter().filter(move |d| d.severity >= min)
    }

    pub fn into_events(self) -> Vec<Diagnostic> {
        self.events
    }
}
