use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use movement_validator::cli::{Cli, VerbosityLevel};
use movement_validator::config::{Config, ConfigError, ConfigManager};
use movement_validator::output::{Output, Report};
use movement_validator::schema_loader::{
    DirectorySchemaLoader, EmbeddedSchemaLoader, SchemaDocumentLoader,
};
use movement_validator::stream::{self, ByteStream, DEFAULT_CHUNK_SIZE};
use movement_validator::{ValidationEngine, ValidationResult};

const EXIT_VALID: u8 = 0;
const EXIT_INVALID: u8 = 1;
const EXIT_INTERNAL: u8 = 2;
const EXIT_CONFIG: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        return ExitCode::from(EXIT_CONFIG);
    }

    let config = match ConfigManager::load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let verbosity = VerbosityLevel::from_flags(config.output.verbose, config.output.quiet);
    init_tracing(verbosity);

    match run(&cli, &config, verbosity).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if e.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::from(EXIT_INTERNAL)
            }
        }
    }
}

fn init_tracing(verbosity: VerbosityLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli, config: &Config, verbosity: VerbosityLevel) -> anyhow::Result<u8> {
    let output = Output::new(verbosity, config.output.format.into());

    let loader: Arc<dyn SchemaDocumentLoader> = match &config.schemas.directory {
        Some(dir) => Arc::new(DirectorySchemaLoader::new(dir)),
        None => Arc::new(EmbeddedSchemaLoader::new()),
    };
    let engine = ValidationEngine::with_loader(loader, config.engine_config());

    if cli.list {
        print!("{}", output.format_message_types(engine.message_types()));
        return Ok(EXIT_VALID);
    }

    if config.schemas.preload {
        let count = engine
            .preload()
            .await
            .context("Failed to preload schemas")?;
        tracing::info!(count, "schemas ready");
    }

    let Some(message_type) = cli.message_type.as_deref() else {
        return Err(ConfigError::Validation("A message type is required".to_string()).into());
    };

    let (body, source) = open_body(cli).await?;

    let started = Instant::now();
    let result = engine.validate(message_type, body).await;
    let report = Report {
        message_type,
        source: &source,
        duration_ms: started.elapsed().as_millis() as u64,
        result: &result,
    };
    print!("{}", output.format_report(&report));

    Ok(exit_code_for(&result))
}

async fn open_body(cli: &Cli) -> anyhow::Result<(ByteStream, String)> {
    match cli.input_path() {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok((
                stream::stream_from_reader(file, DEFAULT_CHUNK_SIZE),
                path.display().to_string(),
            ))
        }
        None => Ok((
            stream::stream_from_reader(tokio::io::stdin(), DEFAULT_CHUNK_SIZE),
            "<stdin>".to_string(),
        )),
    }
}

fn exit_code_for(result: &ValidationResult) -> u8 {
    if result.is_success() {
        EXIT_VALID
    } else if result.is_internal_error() {
        EXIT_INTERNAL
    } else {
        EXIT_INVALID
    }
}
