//! # dwca-validate Library
//!
//! Validates Darwin Core Archives (DwC-A): the zip layout, the `meta.xml`
//! descriptor, the core data table and the EML metadata document, which is
//! checked against an XML Schema through libxml2.
//!
//! ```no_run
//! use std::path::Path;
//! use dwca_validate::{ArchiveValidator, ValidationRules};
//!
//! let validator = ArchiveValidator::new(ValidationRules::default(), Path::new("schemas/gbif/eml.xsd"));
//! let report = validator.validate_path(Path::new("dwca.zip"));
//! println!("valid: {}", report.is_valid());
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod core_data;
pub mod descriptor;
pub mod diagnostics;
pub mod eml;
pub mod error;
pub mod inspector;
pub mod libxml2;
pub mod output;
pub mod pipeline;

pub use archive::{ArchiveEntry, DwcArchive};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigManager, EnvProvider, SystemEnvProvider};
pub use core_data::{CoreResultPolicy, CoreTable};
pub use descriptor::{CoreMapping, DescriptorConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Severity, Stage, StageOutcome};
pub use eml::EmlSchema;
pub use error::{DwcaError, Result};
pub use libxml2::{LibXml2Wrapper, ValidationResult, XmlSchemaPtr};
pub use output::Output;
pub use pipeline::{ArchiveValidator, StageReport, ValidationReport, ValidationRules};
