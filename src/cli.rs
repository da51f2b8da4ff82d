use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only the outcome line, no diagnostics
    Quiet,
    /// Outcome plus every diagnostic
    #[default]
    Normal,
    /// Also the message type details and timing
    Verbose,
}

impl VerbosityLevel {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Default `tracing` filter directive for this level.
    pub fn log_filter(&self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "warn",
            VerbosityLevel::Verbose => "movement_validator=debug,info",
        }
    }
}

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Validate customs movement messages against their registered schemas
#[derive(Parser, Debug, Clone)]
#[command(name = "movement-validator")]
#[command(about = "Validate customs/transit movement messages (XML or JSON) by message type")]
#[command(version)]
pub struct Cli {
    /// Message type code, e.g. IE015 or IE015-JSON
    #[arg(required_unless_present = "list")]
    pub message_type: Option<String>,

    /// Message body to validate; stdin when absent or `-`
    pub file: Option<PathBuf>,

    /// List the registered message types and exit
    #[arg(long = "list", conflicts_with_all = ["message_type", "file"])]
    pub list: bool,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Load schema documents from this directory instead of the built-in bundle
    #[arg(long = "schema-dir")]
    pub schema_dir: Option<PathBuf>,

    /// Directory for temporary spool files
    #[arg(long = "spool-dir")]
    pub spool_dir: Option<PathBuf>,

    /// Seconds to wait for each chunk of the message body
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Check the XML root element before validating the whole document
    #[arg(long = "check-root-element")]
    pub check_root_element: bool,

    /// Compile every schema at startup
    #[arg(long = "preload")]
    pub preload: bool,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (outcome only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The file to read, or `None` for stdin.
    pub fn input_path(&self) -> Option<&Path> {
        self.file
            .as_deref()
            .filter(|path| path.as_os_str() != "-")
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(path) = self.input_path()
            && !path.is_file()
        {
            return Err(format!("File does not exist: {}", path.display()));
        }
        if let Some(timeout) = self.timeout
            && timeout == 0
        {
            return Err("Timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_basic_cli_parsing() {
        let cli = Cli::try_parse_from(["movement-validator", "IE015", "body.xml"]).unwrap();
        assert_eq!(cli.message_type.as_deref(), Some("IE015"));
        assert_eq!(cli.input_path(), Some(Path::new("body.xml")));
        assert!(!cli.list);
    }

    #[test]
    fn test_stdin_input() {
        let cli = Cli::try_parse_from(["movement-validator", "IE015"]).unwrap();
        assert!(cli.input_path().is_none());

        let cli = Cli::try_parse_from(["movement-validator", "IE015", "-"]).unwrap();
        assert!(cli.input_path().is_none());
    }

    #[test]
    fn test_list_needs_no_message_type() {
        let cli = Cli::try_parse_from(["movement-validator", "--list"]).unwrap();
        assert!(cli.list);
        assert!(cli.message_type.is_none());
    }

    #[test]
    fn test_message_type_required() {
        assert!(Cli::try_parse_from(["movement-validator"]).is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["movement-validator", "-v", "-q", "IE015"]).is_err());
    }

    #[test]
    fn test_all_options() {
        let cli = Cli::try_parse_from([
            "movement-validator",
            "--schema-dir",
            "/srv/schemas",
            "--spool-dir",
            "/var/spool/mv",
            "--timeout",
            "5",
            "--check-root-element",
            "--preload",
            "--format",
            "json",
            "-v",
            "IE015-JSON",
            "msg.json",
        ])
        .unwrap();

        assert_eq!(cli.schema_dir, Some(PathBuf::from("/srv/schemas")));
        assert_eq!(cli.spool_dir, Some(PathBuf::from("/var/spool/mv")));
        assert_eq!(cli.timeout, Some(5));
        assert!(cli.check_root_element);
        assert!(cli.preload);
        assert_eq!(cli.output_format, Some(OutputFormat::Json));
        assert!(cli.verbose);
        assert_eq!(cli.message_type.as_deref(), Some("IE015-JSON"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let cli = Cli::try_parse_from(["movement-validator", "--timeout", "0", "IE015"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_file() {
        let cli =
            Cli::try_parse_from(["movement-validator", "IE015", "/nonexistent/body.xml"]).unwrap();
        assert!(cli.validate().unwrap_err().contains("does not exist"));
    }

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(VerbosityLevel::from_flags(false, true), VerbosityLevel::Quiet);
        assert_eq!(VerbosityLevel::from_flags(true, false), VerbosityLevel::Verbose);
        assert_eq!(VerbosityLevel::from_flags(false, false), VerbosityLevel::Normal);
        assert!(VerbosityLevel::Verbose > VerbosityLevel::Normal);
    }
}
