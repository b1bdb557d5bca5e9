//! Receiver configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. TOML file (`--config`, default `receiver.toml`; may be absent)
//! 3. environment (`OVERWATCH_*`) and command line
//!
//! The merged [`ReceiverConfig`] is immutable for the life of the process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::{ReceiverError, Result};
use crate::state::RequestOptions;
use crate::transport::Address;

pub const DEFAULT_ADDRESS: &str = "SUB>tcp://localhost:60201";
pub const DEFAULT_SUBSYSTEM: &str = "EMC";
pub const DEFAULT_DATA_PATH: &str = ".";
pub const DEFAULT_EXTENSION: &str = "rec";
pub const DEFAULT_SLEEP_SECS: f64 = 60.0;
pub const DEFAULT_TIMEOUT_SECS: f64 = 10.0;
pub const DEFAULT_VERBOSITY: u8 = 1;
pub const DEFAULT_CONFIG_PATH: &str = "receiver.toml";

// ---- CLI args ----

#[derive(Parser, Clone, Debug, Default)]
#[command(
    name = "overwatch-receiver",
    version,
    about = "Periodically request records from an aggregator and store them"
)]
pub struct ReceiverArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, env = "OVERWATCH_CONFIG")]
    pub config: String,

    /// Aggregator endpoint, e.g. "REQ>tcp://localhost:60201"
    #[arg(long = "in", env = "OVERWATCH_IN")]
    pub input: Option<String>,

    /// Verbosity: 0 warnings only, 1 info, 2 and above debug
    #[arg(short, long, env = "OVERWATCH_VERBOSE")]
    pub verbose: Option<u8>,

    /// Selection filter forwarded with every request
    #[arg(long, env = "OVERWATCH_SELECT")]
    pub select: Option<String>,

    /// Output directory
    #[arg(long, env = "OVERWATCH_DATA_PATH")]
    pub data_path: Option<String>,

    /// Ask for schemas on the first request
    #[arg(long, env = "OVERWATCH_REQUEST_SCHEMA")]
    pub request_schema: Option<bool>,

    /// Ask the aggregator to reset after each answer
    #[arg(long, env = "OVERWATCH_RESET_MERGER")]
    pub reset_merger: Option<bool>,

    /// Subsystem name used in output and heartbeat file names
    #[arg(long, env = "OVERWATCH_SUBSYSTEM")]
    pub subsystem: Option<String>,

    /// Seconds to sleep between requests
    #[arg(long, env = "OVERWATCH_SLEEP")]
    pub sleep: Option<f64>,

    /// Seconds to wait for a reply
    #[arg(long, env = "OVERWATCH_TIMEOUT")]
    pub timeout: Option<f64>,

    /// Output file extension
    #[arg(long, env = "OVERWATCH_EXTENSION")]
    pub extension: Option<String>,

    /// Write batches received before any run metadata
    #[arg(long, env = "OVERWATCH_WRITE_PLACEHOLDER_RUNS")]
    pub write_placeholder_runs: Option<bool>,
}

// ---- TOML config ----

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(rename = "in")]
    pub input: Option<String>,
    pub verbose: Option<u8>,
    pub select: Option<String>,
    pub data_path: Option<String>,
    pub request_schema: Option<bool>,
    pub reset_merger: Option<bool>,
    pub subsystem: Option<String>,
    pub sleep: Option<f64>,
    pub timeout: Option<f64>,
    pub extension: Option<String>,
    pub write_placeholder_runs: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ReceiverError::Config {
            context: "read",
            detail: format!("'{path}': {e}"),
        })?;
        Self::parse(&content).map_err(|e| match e {
            ReceiverError::Config { context, detail } => ReceiverError::Config {
                context,
                detail: format!("'{path}': {detail}"),
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ReceiverError::Config {
            context: "parse",
            detail: e.to_string(),
        })
    }
}

// ---- Effective config ----

/// Final configuration after merging: TOML < env/CLI.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub address: Address,
    pub verbose: u8,
    pub request: RequestOptions,
    pub data_path: PathBuf,
    pub request_schema: bool,
    pub subsystem: String,
    pub sleep: Duration,
    pub timeout: Duration,
    pub extension: String,
    pub write_placeholder_runs: bool,
}

impl ReceiverConfig {
    /// Load the config file named by `args` and merge it under `args`.
    ///
    /// A missing config file is fine; an unreadable or malformed one is not.
    pub fn new(args: &ReceiverArgs) -> Result<Self> {
        let file = if Path::new(&args.config).exists() {
            FileConfig::load(&args.config)?
        } else {
            FileConfig::default()
        };
        Self::merge(args, file)
    }

    pub fn merge(args: &ReceiverArgs, file: FileConfig) -> Result<Self> {
        let input = args
            .input
            .clone()
            .or(file.input)
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
        let address: Address = input.parse().map_err(|e: ReceiverError| ReceiverError::Config {
            context: "in",
            detail: e.to_string(),
        })?;

        let data_path = args
            .data_path
            .clone()
            .or(file.data_path)
            .unwrap_or_else(|| DEFAULT_DATA_PATH.to_string());

        Ok(Self {
            address,
            verbose: args.verbose.or(file.verbose).unwrap_or(DEFAULT_VERBOSITY),
            request: RequestOptions {
                select: args.select.clone().or(file.select),
                reset_on_request: args.reset_merger.or(file.reset_merger).unwrap_or(false),
            },
            data_path: normalize_data_path(&data_path),
            request_schema: args.request_schema.or(file.request_schema).unwrap_or(true),
            subsystem: args
                .subsystem
                .clone()
                .or(file.subsystem)
                .unwrap_or_else(|| DEFAULT_SUBSYSTEM.to_string()),
            sleep: seconds(
                "sleep",
                args.sleep.or(file.sleep).unwrap_or(DEFAULT_SLEEP_SECS),
            )?,
            timeout: seconds(
                "timeout",
                args.timeout.or(file.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS),
            )?,
            extension: args
                .extension
                .clone()
                .or(file.extension)
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
            write_placeholder_runs: args
                .write_placeholder_runs
                .or(file.write_placeholder_runs)
                .unwrap_or(false),
        })
    }

    /// Default log filter for this verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

/// Strip trailing slashes; an empty path means the working directory.
fn normalize_data_path(path: &str) -> PathBuf {
    let trimmed = path.trim_end_matches('/');
    match (trimmed.is_empty(), path.starts_with('/')) {
        (false, _) => PathBuf::from(trimmed),
        (true, true) => PathBuf::from("/"),
        (true, false) => PathBuf::from(DEFAULT_DATA_PATH),
    }
}

/// Convert fractional seconds to a duration rounded to milliseconds.
fn seconds(context: &'static str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ReceiverError::Config {
            context,
            detail: format!("expected a non-negative number of seconds, got {secs}"),
        });
    }
    Ok(Duration::from_millis((secs * 1e3).round() as u64))
}

impl fmt::Display for ReceiverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Running receiver with configuration:")?;
        writeln!(f, "\tSubsystem: \"{}\"", self.subsystem)?;
        writeln!(f, "\tVerbosity: {}", self.verbose)?;
        writeln!(
            f,
            "\tSelection: \"{}\"",
            self.request.select.as_deref().unwrap_or_default()
        )?;
        writeln!(f, "\tData directory: \"{}\"", self.data_path.display())?;
        writeln!(f, "\tRequest schemas: {}", self.request_schema)?;
        writeln!(f, "\tReset merger: {}", self.request.reset_on_request)?;
        writeln!(f, "\tSleep time between requests: {} s", self.sleep.as_secs_f64())?;
        writeln!(f, "\tRequest timeout: {} s", self.timeout.as_secs_f64())?;
        writeln!(f, "\tOutput extension: \"{}\"", self.extension)?;
        writeln!(f, "\tWrite placeholder runs: {}", self.write_placeholder_runs)?;
        write!(f, "\tIn configuration: {}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SocketMode;

    fn args(argv: &[&str]) -> ReceiverArgs {
        let mut full = vec!["overwatch-receiver"];
        full.extend_from_slice(argv);
        ReceiverArgs::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ReceiverConfig::merge(&ReceiverArgs::default(), FileConfig::default()).unwrap();

        assert_eq!(config.address.to_string(), "SUB>tcp://localhost:60201");
        assert_eq!(config.subsystem, "EMC");
        assert_eq!(config.data_path, PathBuf::from("."));
        assert_eq!(config.sleep, Duration::from_secs(60));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.extension, "rec");
        assert!(config.request_schema);
        assert!(!config.request.reset_on_request);
        assert!(!config.write_placeholder_runs);
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig::parse(
            r#"
            in = "SUB>tcp://merger:1000"
            subsystem = "TPC"
            sleep = 5
            timeout = 2.5
            "#,
        )
        .unwrap();
        let cli = args(&["--in", "REQ>tcp://127.0.0.1:2000", "--sleep", "0.25"]);

        let config = ReceiverConfig::merge(&cli, file).unwrap();

        assert_eq!(config.address.mode, SocketMode::Request);
        assert_eq!(config.address.to_string(), "REQ>tcp://127.0.0.1:2000");
        assert_eq!(config.subsystem, "TPC");
        assert_eq!(config.sleep, Duration::from_millis(250));
        assert_eq!(config.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_boolean_flags() {
        let cli = args(&[
            "--request-schema",
            "false",
            "--reset-merger",
            "true",
            "--select",
            "h*",
            "-v",
            "2",
        ]);
        let config = ReceiverConfig::merge(&cli, FileConfig::default()).unwrap();

        assert!(!config.request_schema);
        assert!(config.request.reset_on_request);
        assert_eq!(config.request.select.as_deref(), Some("h*"));
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_data_path_trailing_slash() {
        assert_eq!(normalize_data_path("/data/out//"), PathBuf::from("/data/out"));
        assert_eq!(normalize_data_path("out/"), PathBuf::from("out"));
        assert_eq!(normalize_data_path("/"), PathBuf::from("/"));
        assert_eq!(normalize_data_path(""), PathBuf::from("."));
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_address = args(&["--in", "tcp://nowhere"]);
        assert!(matches!(
            ReceiverConfig::merge(&bad_address, FileConfig::default()),
            Err(ReceiverError::Config { context: "in", .. })
        ));

        let bad_sleep = args(&["--sleep=-1"]);
        assert!(matches!(
            ReceiverConfig::merge(&bad_sleep, FileConfig::default()),
            Err(ReceiverError::Config { context: "sleep", .. })
        ));

        assert!(FileConfig::parse("unknown_key = 1").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let cli = args(&["--config", "/nonexistent/receiver.toml"]);
        let config = ReceiverConfig::new(&cli).unwrap();
        assert_eq!(config.subsystem, "EMC");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("receiver.toml");
        std::fs::write(&path, "sleep = [").unwrap();

        let cli = args(&["--config", path.to_str().unwrap()]);
        assert!(matches!(
            ReceiverConfig::new(&cli),
            Err(ReceiverError::Config { context: "parse", .. })
        ));
    }

    #[test]
    fn test_banner() {
        let config = ReceiverConfig::merge(&ReceiverArgs::default(), FileConfig::default()).unwrap();
        let banner = config.to_string();

        assert!(banner.starts_with("Running receiver with configuration:\n"));
        assert!(banner.contains("\tSubsystem: \"EMC\"\n"));
        assert!(banner.contains("\tSleep time between requests: 60 s\n"));
        assert!(banner.ends_with("\tIn configuration: SUB>tcp://localhost:60201"));
    }
}
