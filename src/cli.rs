use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core_data::CoreResultPolicy;
use crate::diagnostics::Severity;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerbosityLevel {
    /// Only show failures
    Quiet,
    /// Show failures and warnings
    #[default]
    Normal,
    /// Also show passed checks
    Verbose,
    /// Show every diagnostic
    Debug,
}

impl VerbosityLevel {
    /// Lowest severity surfaced at this verbosity
    pub fn min_severity(&self) -> Severity {
        match self {
            VerbosityLevel::Quiet => Severity::Failure,
            VerbosityLevel::Normal => Severity::Warning,
            VerbosityLevel::Verbose => Severity::Success,
            VerbosityLevel::Debug => Severity::Info,
        }
    }
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable report
    #[default]
    Human,
    /// Full report as JSON
    Json,
}

/// Darwin Core Archive validator
#[derive(Parser, Debug, Clone)]
#[command(name = "dwca-validate")]
#[command(
    about = "Validate a Darwin Core Archive: archive layout, meta.xml, core data file and EML metadata"
)]
#[command(version)]
pub struct Cli {
    /// Path to the DwC-A zip file
    #[arg(help = "DwC-A zip archive to validate")]
    pub archive: PathBuf,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// EML XML Schema (XSD) used to validate the metadata document
    #[arg(short = 's', long = "schema")]
    pub schema: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output (repeat for every diagnostic)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Enable quiet mode (failures only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Validation timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Allowed entry extensions (comma-separated)
    #[arg(
        short = 'e',
        long = "extensions",
        help = "Allowed archive entry extensions (e.g., 'xml,tab,csv')"
    )]
    pub extensions: Option<String>,

    /// How the coordinate check combines with the column checks
    #[arg(long = "core-result", help = "combine | coordinates-only")]
    pub core_result: Option<CoreResultPolicy>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn get_extensions(&self) -> Option<Vec<String>> {
        self.extensions.as_ref().map(|extensions| {
            extensions
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    pub fn verbosity(&self) -> Option<VerbosityLevel> {
        if self.quiet {
            Some(VerbosityLevel::Quiet)
        } else {
            match self.verbose {
                0 => None,
                1 => Some(VerbosityLevel::Verbose),
                _ => Some(VerbosityLevel::Debug),
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.archive.exists() {
            return Err(format!("Archive does not exist: {}", self.archive.display()));
        }
        if let Some(timeout) = self.timeout
            && timeout == 0
        {
            return Err("Timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}
