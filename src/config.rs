use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use clap::{ArgAction, Parser, ValueEnum};
use serde::Deserialize;
use tracing::Level;

pub const DEFAULT_PORT: u16 = 8123;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Serves each requested path from the first origin that has it.
#[derive(Parser, Debug)]
#[command(
    name = "moproxy",
    version,
    after_help = "Non-flag arguments: multiple origin base URLs for proxy requests, tried in order"
)]
pub struct Cli {
    /// Port to listen on [default: 8123]
    #[arg(long)]
    pub port: Option<u16>,

    /// Logging level [default: INFO]
    #[arg(long, value_enum, ignore_case = true)]
    pub loglevel: Option<LogLevel>,

    /// Per-origin timeout for connecting and receiving response headers [default: 30]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Refuse to start when any origin URL is invalid
    #[arg(long, action = ArgAction::SetTrue)]
    pub strict: bool,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Origin base URLs
    pub origins: Vec<String>,
}

#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "UPPER")]
#[serde(try_from = "String")]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        <Self as ValueEnum>::from_str(&value, true)
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            // tracing has nothing above error
            LogLevel::Fatal | LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Contents of the optional YAML configuration file.
#[derive(Deserialize, Debug, Default)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub loglevel: Option<LogLevel>,
    pub timeout_secs: Option<u64>,
    pub strict: bool,
    pub origins: Vec<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Rejects values that parse but could never work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

/// Effective startup settings after merging flags, file and defaults.
#[derive(Debug, PartialEq, Eq)]
pub struct Settings {
    pub port: u16,
    pub loglevel: LogLevel,
    pub timeout: Duration,
    pub strict: bool,
    pub origins: Vec<String>,
}

impl Settings {
    /// Reads the config file named by `cli`, if any, and merges it.
    pub fn load(cli: Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(cli, file))
    }

    /// Command-line values win over the file, the file wins over defaults.
    /// Positional origins replace the file's list when any are given.
    pub fn merge(cli: Cli, file: FileConfig) -> Self {
        let origins = if !cli.origins.is_empty() {
            cli.origins
        } else {
            file.origins
        };
        let timeout_secs = cli
            .timeout
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            loglevel: cli.loglevel.or(file.loglevel).unwrap_or(LogLevel::Info),
            timeout: Duration::from_secs(timeout_secs),
            strict: cli.strict || file.strict,
            origins,
        }
    }
}
