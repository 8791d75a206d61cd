//! Validation Pipeline
//!
//! Runs the four stages in order over one archive:
//! - **Archive**: entry count, extensions, sizes, `meta.xml` and data file presence
//! - **Descriptor**: `meta.xml` into a [`DescriptorConfig`]
//! - **Core data**: core file columns against the declared fields, coordinates
//! - **Metadata**: EML document against the external schema, root element
//!
//! Every stage runs even when an earlier one failed, so a single call yields the
//! full diagnostic report. Later stages receive the earlier stages' outputs as
//! explicit inputs; nothing is shared through mutable state.

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::archive::DwcArchive;
use crate::core_data::{self, CoreResultPolicy, MANDATORY_FIELDS};
use crate::descriptor::{self, DescriptorConfig};
use crate::diagnostics::{Diagnostic, Diagnostics, Severity, Stage, StageOutcome};
use crate::eml::{self, EmlSchema};
use crate::inspector::{self, ArchiveInventory};
use crate::libxml2::LibXml2Wrapper;

/// Fixed rule set applied by the stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Minimum number of archive entries
    pub min_entries: usize,
    /// Accepted entry extensions; all but `xml` count as data files
    pub allowed_extensions: Vec<String>,
    /// Identifier column excluded from the schema comparison
    pub id_column: String,
    /// Terms every descriptor must declare
    pub mandatory_fields: Vec<String>,
    pub core_result: CoreResultPolicy,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_entries: 3,
            allowed_extensions: vec!["xml".to_string(), "tab".to_string(), "csv".to_string()],
            id_column: "id".to_string(),
            mandatory_fields: MANDATORY_FIELDS.iter().map(|f| f.to_string()).collect(),
            core_result: CoreResultPolicy::default(),
        }
    }
}

impl ValidationRules {
    pub fn allows_extension(&self, ext: &str) -> bool {
        self.allowed_extensions.iter().any(|e| e == ext)
    }

    pub fn is_data_extension(&self, ext: &str) -> bool {
        ext != "xml" && self.allows_extension(ext)
    }
}

/// Outcome of one stage in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: StageOutcome,
}

impl StageReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_passed()
    }
}

/// Complete result of validating one archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub archive: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub valid: bool,
    pub stages: Vec<StageReport>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    fn aggregate(
        archive: Option<PathBuf>,
        started_at: DateTime<Utc>,
        duration: Duration,
        stages: Vec<StageReport>,
        diagnostics: Diagnostics,
    ) -> Self {
        let valid = stages.iter().all(StageReport::passed);
        Self {
            archive,
            started_at,
            duration,
            valid,
            stages,
            diagnostics: diagnostics.into_events(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn stage_passed(&self, stage: Stage) -> bool {
        self.stage(stage).is_some_and(StageReport::passed)
    }

    pub fn failed_stages(&self) -> usize {
        self.stages.iter().filter(|s| !s.passed()).count()
    }

    /// Diagnostics at or above `min`, in pipeline order
    pub fn diagnostics_at_least(&self, min: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.severity >= min)
    }

    pub fn messages(&self, stage: Stage, severity: Severity) -> Vec<&str> {
        self.diagnostics
            .iter()
            .filter(|d| d.stage == stage && d.severity == severity)
            .map(|d| d.message.as_str())
            .collect()
    }
}

/// Validates Darwin Core Archives with one rule set and one loaded EML schema
pub struct ArchiveValidator {
    rules: ValidationRules,
    wrapper: LibXml2Wrapper,
    schema: EmlSchema,
}

impl ArchiveValidator {
    /// Build a validator; the EML schema at `schema_path` is loaded once here
    pub fn new(rules: ValidationRules, schema_path: &Path) -> Self {
        let wrapper = LibXml2Wrapper::new();
        let schema = EmlSchema::load(&wrapper, schema_path);
        Self::with_schema(rules, wrapper, schema)
    }

    pub fn with_schema(rules: ValidationRules, wrapper: LibXml2Wrapper, schema: EmlSchema) -> Self {
        Self {
            rules,
            wrapper,
            schema,
        }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    pub fn schema(&self) -> &EmlSchema {
        &self.schema
    }

    /// Validate the archive at `path`
    pub fn validate_path(&self, path: &Path) -> ValidationReport {
        tracing::info!(archive = %path.display(), "validating DwC-A archive");
        let opened = DwcArchive::open(path);
        self.run(Some(path.to_path_buf()), opened)
    }

    /// Validate an archive held in memory
    pub fn validate_bytes(&self, bytes: Vec<u8>) -> ValidationReport {
        self.run(None, DwcArchive::from_bytes(bytes))
    }

    /// Validate an archive from any seekable reader
    pub fn validate_reader<R: Read + Seek>(&self, reader: R) -> ValidationReport {
        self.run(None, DwcArchive::from_reader(reader))
    }

    fn run<R: Read + Seek>(
        &self,
        path: Option<PathBuf>,
        opened: crate::Result<DwcArchive<R>>,
    ) -> ValidationReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut diags = Diagnostics::new();

        let mut archive = None;
        let inventory = match opened {
            Ok(opened) => {
                diags.success(Stage::Archive, "Successfully opened ZIP archive");
                let opened = archive.insert(opened);
                inspector::inspect(opened, &self.rules, &mut diags)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not open archive");
                ArchiveInventory::unreadable(&mut diags, e)
            }
        };
        let descriptor =
            descriptor::validate_descriptor(inventory.descriptor.as_deref(), &mut diags);
        let config: Option<&DescriptorConfig> = descriptor.config.as_ref();

        let core_outcome = core_data::validate_core_data(
            config,
            &inventory,
            archive.as_mut(),
            &self.rules,
            &mut diags,
        );
        let metadata_outcome = eml::validate_metadata(
            config,
            &inventory,
            archive.as_mut(),
            &self.wrapper,
            &self.schema,
            &mut diags,
        );

        let stages = vec![
            StageReport {
                stage: Stage::Archive,
                outcome: inventory.outcome.clone(),
            },
            StageReport {
                stage: Stage::Descriptor,
                outcome: descriptor.outcome.clone(),
            },
            StageReport {
                stage: Stage::CoreData,
                outcome: core_outcome,
            },
            StageReport {
                stage: Stage::Metadata,
                outcome: metadata_outcome,
            },
        ];

        for stage in &stages {
            tracing::info!(stage = %stage.stage, passed = stage.passed(), "stage finished");
        }

        ValidationReport::aggregate(path, started_at, start.elapsed(), stages, diags)
    }
}
