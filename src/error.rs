use std::path::PathBuf;

use thiserror::Error;

/// Main library error type that encompasses all lower-level failure modes.
///
/// Stages never let these escape: each one is converted into a failed
/// [`StageOutcome`](crate::diagnostics::StageOutcome) plus a diagnostic.
#[derive(Error, Debug)]
pub enum DwcaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Content of {name} is not valid UTF-8")]
    Encoding { name: String },

    #[error("Archive entry not found: {name}")]
    EntryNotFound { name: String },

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Core data error: {0}")]
    CoreData(#[from] CoreDataError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("Schema not found: {path}")]
    SchemaNotFound { path: PathBuf },

    #[error("Validation timed out after {timeout_seconds} seconds: {path}")]
    Timeout { path: PathBuf, timeout_seconds: u64 },
}

/// Descriptor (meta.xml) specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Invalid root tag in meta.xml: {tag}")]
    InvalidRoot { tag: String },

    #[error("Could not find 'core' element in meta.xml")]
    MissingCore,

    #[error("Could not find core data file name in meta.xml")]
    MissingCoreLocation,

    #[error("Missing EML file location in meta.xml")]
    MissingMetadata,
}

/// Core data table specific error types
#[derive(Error, Debug)]
pub enum CoreDataError {
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unsupported field delimiter: {token:?}")]
    UnsupportedDelimiter { token: String },

    #[error("Unsupported field enclosure: {token:?}")]
    UnsupportedEnclosure { token: String },

    #[error("Missing identifier column '{column}'")]
    MissingIdColumn { column: String },

    #[error("Row {row}: expected at most {expected} fields, saw {actual}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Missing column '{column}'")]
    MissingColumn { column: String },

    #[error("Non-numeric value {value:?} in column '{column}' at row {row}")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },
}

/// Configuration-specific error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: null pointer returned")]
    SchemaParseFailed,

    #[error("Schema path is not representable as a C string: {path}")]
    InvalidPath { path: PathBuf },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Document validation failed with code {code}: {name}")]
    ValidationFailed { code: i32, name: String },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Invalid XML structure: {details}")]
    InvalidXml { details: String },
}

impl From<ConfigError> for DwcaError {
    fn from(err: ConfigError) -> Self {
        DwcaError::Config(err.to_string())
    }
}

impl From<LibXml2Error> for DwcaError {
    fn from(err: LibXml2Error) -> Self {
        DwcaError::LibXml2Internal {
            details: err.to_string(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, DwcaError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
