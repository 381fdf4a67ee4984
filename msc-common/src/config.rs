//! Configuration loading
//!
//! Settings are resolved per value, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable (`MSC_DATA_DIR`, `MSC_YEAR`)
//! 3. TOML config file (`--config`, else `{config_dir}/msc/config.toml`)
//! 4. Compiled defaults
//!
//! A missing TOML file is not an error: a warning is logged and the
//! remaining sources apply. A TOML file that exists but does not parse is a
//! configuration error.

use crate::events::NotifyPolicy;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "MSC_DATA_DIR";

/// Environment variable overriding the target year
pub const YEAR_ENV: &str = "MSC_YEAR";

pub const DEFAULT_DATA_DIR: &str = "_data";
pub const DEFAULT_YEAR: i32 = 2025;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Accepted range for the target year
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 2000..=2100;

/// Contents of the TOML config file
///
/// Every field is optional; absent values fall through to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub year: Option<i32>,

    /// Also fetch YouTube metrics during enrichment
    #[serde(default)]
    pub include_youtube: Option<bool>,

    #[serde(default)]
    pub verbose: Option<bool>,

    #[serde(default)]
    pub notify_policy: Option<NotifyPolicy>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[logging]` table
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl TomlConfig {
    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load a TOML config file
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            warn!("Config file not found at {}, using defaults", path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded config from {}", path.display());
        Ok(Some(config))
    }
}

/// Platform config file location (`~/.config/msc/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("msc").join("config.toml"))
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub year: Option<i32>,
    pub include_youtube: Option<bool>,
    /// `--verbose` can only switch verbosity on
    pub verbose: bool,
    pub notify_policy: Option<NotifyPolicy>,
}

/// Fully resolved runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub year: i32,
    pub include_youtube: bool,
    pub verbose: bool,
    pub notify_policy: NotifyPolicy,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            year: DEFAULT_YEAR,
            include_youtube: false,
            verbose: false,
            notify_policy: NotifyPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Resolve settings from CLI, environment, TOML file and defaults
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let toml_path = cli.config.clone().or_else(default_config_path);
        let toml = match toml_path {
            Some(path) => TomlConfig::load(&path)?.unwrap_or_default(),
            None => {
                warn!("Could not determine config directory, using defaults");
                TomlConfig::default()
            }
        };

        Self::merge(cli, &toml)
    }

    /// Merge CLI values and environment over an already-loaded TOML config
    pub fn merge(cli: &CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let defaults = Settings::default();

        let data_dir = cli
            .data_dir
            .clone()
            .or_else(|| std::env::var(DATA_DIR_ENV).ok().map(PathBuf::from))
            .or_else(|| toml.data_dir.clone())
            .unwrap_or(defaults.data_dir);

        let year = match cli.year {
            Some(year) => year,
            None => match env_year()? {
                Some(year) => year,
                None => toml.year.unwrap_or(defaults.year),
            },
        };

        if !YEAR_RANGE.contains(&year) {
            return Err(Error::Config(format!(
                "year {} out of range ({}..={})",
                year,
                YEAR_RANGE.start(),
                YEAR_RANGE.end()
            )));
        }

        Ok(Self {
            data_dir,
            year,
            include_youtube: cli
                .include_youtube
                .or(toml.include_youtube)
                .unwrap_or(defaults.include_youtube),
            verbose: cli.verbose || toml.verbose.unwrap_or(defaults.verbose),
            notify_policy: cli
                .notify_policy
                .or(toml.notify_policy)
                .unwrap_or(defaults.notify_policy),
            log_level: toml.logging.level.clone(),
        })
    }

    /// `{data_dir}/runs`
    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    /// `{data_dir}/output`
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    /// `{data_dir}/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// `{data_dir}/input`
    pub fn input_dir(&self) -> PathBuf {
        self.data_dir.join("input")
    }
}

fn env_year() -> Result<Option<i32>> {
    match std::env::var(YEAR_ENV) {
        Ok(raw) => raw
            .trim()
            .parse::<i32>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}='{}' is not a year: {}", YEAR_ENV, raw, e))),
        Err(_) => Ok(None),
    }
}
