use crate::cli::{Cli, OutputFormat};
use crate::validator;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

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

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Longest accepted per-chunk read timeout.
pub const MAX_READ_TIMEOUT_SECONDS: u64 = 3600;

const ENV_PREFIX: &str = "MOVEMENT_VALIDATOR_";

const CONFIG_FILE_NAMES: [&str; 4] = [
    "movement-validator.toml",
    "movement-validator.json",
    ".movement-validator.toml",
    ".movement-validator.json",
];

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationSettings,
    pub schemas: SchemaSettings,
    pub spool: SpoolSettings,
    pub output: OutputSettings,
}

/// Validation-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationSettings {
    /// Seconds to wait for each chunk of a message body
    pub read_timeout_seconds: u64,
    /// Check the XML root element before full validation
    pub check_root_element: bool,
}

/// Where schema documents come from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SchemaSettings {
    /// Directory overriding the built-in schema bundle
    pub directory: Option<PathBuf>,
    /// Compile every schema at startup
    pub preload: bool,
}

/// Temporary spool file configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SpoolSettings {
    /// Spool directory; the OS temp directory when unset
    pub directory: Option<PathBuf>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputSettings {
    /// Output format
    pub format: OutputFormatConfig,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (outcome only)
    pub quiet: bool,
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    #[default]
    Human,
    Json,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            read_timeout_seconds: validator::DEFAULT_READ_TIMEOUT.as_secs(),
            check_root_element: false,
        }
    }
}

impl Config {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.validation.read_timeout_seconds)
    }

    /// Settings for the validation engine.
    pub fn engine_config(&self) -> validator::ValidationConfig {
        validator::ValidationConfig {
            read_timeout: self.read_timeout(),
            spool_directory: self.spool.directory.clone(),
            check_root_element: self.validation.check_root_element,
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(cli, &SystemEnvProvider).await
    }

    pub async fn load_config_with(cli: &Cli, env: &impl EnvProvider) -> Result<Config> {
        let mut config = match &cli.config {
            Some(config_path) => Self::load_from_file(config_path).await?,
            None => Self::find_config_file().await?.unwrap_or_default(),
        };

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in the working directory, then the user config directory
    pub async fn find_config_file() -> Result<Option<Config>> {
        let mut search_dirs = vec![PathBuf::from(".")];
        if let Some(config_dir) = dirs::config_dir() {
            search_dirs.push(config_dir.join("movement-validator"));
        }
        Self::find_config_file_in(&search_dirs).await
    }

    /// First configuration file found in `search_dirs`, in order.
    pub async fn find_config_file_in(search_dirs: &[PathBuf]) -> Result<Option<Config>> {
        for dir in search_dirs {
            for name in &CONFIG_FILE_NAMES {
                let path = dir.join(name);
                if path.is_file() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }
        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(timeout) = env_value(env, "TIMEOUT") {
            config.validation.read_timeout_seconds = parse_env("TIMEOUT", &timeout)?;
        }
        if let Some(check) = env_value(env, "CHECK_ROOT_ELEMENT") {
            config.validation.check_root_element = parse_env("CHECK_ROOT_ELEMENT", &check)?;
        }

        if let Some(schema_dir) = env_value(env, "SCHEMA_DIR") {
            config.schemas.directory = Some(PathBuf::from(schema_dir));
        }
        if let Some(preload) = env_value(env, "PRELOAD") {
            config.schemas.preload = parse_env("PRELOAD", &preload)?;
        }

        if let Some(spool_dir) = env_value(env, "SPOOL_DIR") {
            config.spool.directory = Some(PathBuf::from(spool_dir));
        }

        if let Some(verbose) = env_value(env, "VERBOSE") {
            config.output.verbose = parse_env("VERBOSE", &verbose)?;
        }
        if let Some(quiet) = env_value(env, "QUIET") {
            config.output.quiet = parse_env("QUIET", &quiet)?;
        }
        if let Some(format) = env_value(env, "FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid {}FORMAT value: {}",
                        ENV_PREFIX, format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    ///
    /// Flags can only switch a setting on; an absent flag keeps the
    /// configured value.
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(timeout) = cli.timeout {
            config.validation.read_timeout_seconds = timeout;
        }
        if cli.check_root_element {
            config.validation.check_root_element = true;
        }

        if let Some(schema_dir) = &cli.schema_dir {
            config.schemas.directory = Some(schema_dir.clone());
        }
        if cli.preload {
            config.schemas.preload = true;
        }

        if let Some(spool_dir) = &cli.spool_dir {
            config.spool.directory = Some(spool_dir.clone());
        }

        if let Some(format) = cli.output_format {
            config.output.format = format.into();
        }
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.validation.read_timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Read timeout must be greater than 0".to_string(),
            ));
        }
        if config.validation.read_timeout_seconds > MAX_READ_TIMEOUT_SECONDS {
            return Err(ConfigError::Validation(format!(
                "Read timeout cannot exceed {} seconds",
                MAX_READ_TIMEOUT_SECONDS
            )));
        }

        if let Some(dir) = &config.schemas.directory
            && !dir.is_dir()
        {
            return Err(ConfigError::Validation(format!(
                "Schema directory does not exist: {}",
                dir.display()
            )));
        }

        if let Some(dir) = &config.spool.directory
            && !dir.is_dir()
        {
            return Err(ConfigError::Validation(format!(
                "Spool directory does not exist: {}",
                dir.display()
            )));
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_value(env: &impl EnvProvider, suffix: &str) -> Option<String> {
    env.get(&format!("{}{}", ENV_PREFIX, suffix))
}

fn parse_env<T: std::str::FromStr>(suffix: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::Environment(format!("Invalid {}{} value: {}", ENV_PREFIX, suffix, value))
    })
}
