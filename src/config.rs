use crate::cli::{Cli, OutputFormat, VerbosityLevel};
use crate::core_data::CoreResultPolicy;
use crate::error::{ConfigError, ConfigResult as Result};
use crate::pipeline::ValidationRules;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "DWCA_VALIDATE_";

const CONFIG_NAMES: [&str; 4] = [
    "dwca-validate.toml",
    "dwca-validate.json",
    ".dwca-validate.toml",
    ".dwca-validate.json",
];

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationConfig,
    pub schema: SchemaConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Archive rule settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum number of archive entries
    pub min_entries: usize,
    /// Accepted entry extensions
    pub allowed_extensions: Vec<String>,
    /// Identifier column dropped before the column comparison
    pub id_column: String,
    /// Terms the descriptor must declare
    pub mandatory_fields: Vec<String>,
    pub core_result: CoreResultPolicy,
    /// Whole-run timeout in seconds
    pub timeout_seconds: u64,
}

/// EML schema location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchemaConfig {
    pub eml_xsd: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub verbosity: VerbosityLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let rules = ValidationRules::default();
        Self {
            min_entries: rules.min_entries,
            allowed_extensions: rules.allowed_extensions,
            id_column: rules.id_column,
            mandatory_fields: rules.mandatory_fields,
            core_result: rules.core_result,
            timeout_seconds: 60,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            eml_xsd: PathBuf::from("schemas/gbif/eml.xsd"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        let mut config = match &cli.config {
            Some(path) => Self::load_from_file(path).await?,
            None => Self::find_config_file().await?.unwrap_or_default(),
        };

        config = Self::apply_environment_overrides(config)?;
        config = Self::merge_with_cli(config, cli);
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;
        tracing::debug!(path = %path.display(), "loading configuration file");

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => match toml::from_str::<Config>(&content) {
                Ok(config) => Ok(config),
                Err(_) => Ok(serde_json::from_str(&content)?),
            },
        }
    }

    /// Look in the working directory, then the user config directory
    pub async fn find_config_file() -> Result<Option<Config>> {
        let mut search = vec![PathBuf::new()];
        if let Some(config_dir) = dirs::config_dir() {
            search.push(config_dir.join("dwca-validate"));
        }
        Self::find_config_file_in(&search).await
    }

    /// First known config file name found in `dirs`, in order
    pub async fn find_config_file_in(dirs: &[PathBuf]) -> Result<Option<Config>> {
        for dir in dirs {
            for name in &CONFIG_NAMES {
                let path = dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }
        Ok(None)
    }

    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply `DWCA_VALIDATE_*` overrides read through `env`
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        let var = |key: &str| env.get(&format!("{ENV_PREFIX}{key}"));

        if let Some(schema) = var("SCHEMA") {
            config.schema.eml_xsd = PathBuf::from(schema);
        }

        if let Some(timeout) = var("TIMEOUT") {
            config.validation.timeout_seconds = parse_env("TIMEOUT", &timeout)?;
        }

        if let Some(min_entries) = var("MIN_ENTRIES") {
            config.validation.min_entries = parse_env("MIN_ENTRIES", &min_entries)?;
        }

        if let Some(extensions) = var("EXTENSIONS") {
            config.validation.allowed_extensions = split_list(&extensions);
        }

        if let Some(id_column) = var("ID_COLUMN") {
            config.validation.id_column = id_column;
        }

        if let Some(policy) = var("CORE_RESULT") {
            config.validation.core_result = parse_env("CORE_RESULT", &policy)?;
        }

        if let Some(format) = var("FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormat::Human,
                "json" => OutputFormat::Json,
                _ => return Err(invalid_env("FORMAT", &format)),
            };
        }

        if let Some(verbosity) = var("VERBOSITY") {
            config.output.verbosity = match verbosity.to_lowercase().as_str() {
                "quiet" => VerbosityLevel::Quiet,
                "normal" => VerbosityLevel::Normal,
                "verbose" => VerbosityLevel::Verbose,
                "debug" => VerbosityLevel::Debug,
                _ => return Err(invalid_env("VERBOSITY", &verbosity)),
            };
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(schema) = &cli.schema {
            config.schema.eml_xsd = schema.clone();
        }
        if let Some(timeout) = cli.timeout {
            config.validation.timeout_seconds = timeout;
        }
        if let Some(extensions) = cli.get_extensions() {
            config.validation.allowed_extensions = extensions;
        }
        if let Some(policy) = cli.core_result {
            config.validation.core_result = policy;
        }
        if let Some(format) = cli.format {
            config.output.format = format;
        }
        if let Some(verbosity) = cli.verbosity() {
            config.output.verbosity = verbosity;
        }
        if cli.quiet && config.logging.level == LoggingConfig::default().level {
            config.logging.level = "error".to_string();
        }

        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        let validation = &config.validation;

        if validation.min_entries == 0 {
            return Err(ConfigError::Validation(
                "Minimum entry count must be greater than 0".to_string(),
            ));
        }

        if validation.allowed_extensions.is_empty() {
            return Err(ConfigError::Validation(
                "At least one file extension must be specified".to_string(),
            ));
        }

        for ext in &validation.allowed_extensions {
            if ext.contains('/') || ext.contains('\\') || ext.contains('.') {
                return Err(ConfigError::Validation(format!(
                    "Invalid file extension: {}",
                    ext
                )));
            }
        }

        if validation.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if validation.id_column.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Identifier column name must not be empty".to_string(),
            ));
        }

        if config.schema.eml_xsd.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "EML schema path must not be empty".to_string(),
            ));
        }

        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.level) {
            return Err(ConfigError::Validation(format!(
                "Invalid log level '{}': {}",
                config.logging.level, e
            )));
        }

        Ok(())
    }

    /// Rule set handed to the pipeline
    pub fn rules(config: &Config) -> ValidationRules {
        ValidationRules {
            min_entries: config.validation.min_entries,
            allowed_extensions: config.validation.allowed_extensions.clone(),
            id_column: config.validation.id_column.clone(),
            mandatory_fields: config.validation.mandatory_fields.clone(),
            core_result: config.validation.core_result,
        }
    }

    pub fn get_timeout_duration(config: &Config) -> Duration {
        Duration::from_secs(config.validation.timeout_seconds)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn invalid_env(key: &str, value: &str) -> ConfigError {
    ConfigError::Environment(format!("Invalid {ENV_PREFIX}{key} value: {value}"))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid_env(key, value))
}
