use std::process::ExitCode;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use dwca_validate::{ArchiveValidator, Cli, Config, ConfigManager, DwcaError, Output};

const EXIT_INVALID: u8 = 1;
const EXIT_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    if let Err(e) = cli.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_INVALID),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            // Exit without waiting on a timed-out blocking validation task
            std::process::exit(i32::from(EXIT_ERROR));
        }
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second init (e.g. under a test harness) is not an error for the CLI
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = ConfigManager::load_config(&cli)
        .await
        .context("failed to load configuration")?;
    init_logging(&config);

    let rules = ConfigManager::rules(&config);
    let schema_path = config.schema.eml_xsd.clone();
    let archive = cli.archive.clone();
    let timeout = ConfigManager::get_timeout_duration(&config);

    tracing::debug!(schema = %schema_path.display(), ?timeout, "starting validation");

    let task = tokio::task::spawn_blocking(move || {
        let validator = ArchiveValidator::new(rules, &schema_path);
        validator.validate_path(&archive)
    });

    let report = match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined.context("validation task failed")?,
        Err(_) => {
            return Err(DwcaError::Timeout {
                path: cli.archive.clone(),
                timeout_seconds: config.validation.timeout_seconds,
            }
            .into());
        }
    };

    let output = Output::new(config.output.verbosity, config.output.format);
    print!("{}", output.render(&report)?);
    if !report.is_valid() {
        tracing::info!(failed = report.failed_stages(), "archive is not valid");
    }

    Ok(report.is_valid())
}
