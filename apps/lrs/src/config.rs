//! # Configuration
//!
//! Settings are layered, highest precedence first:
//! 1. Command-line flags
//! 2. Environment (`LRS_DATABASE`, `LRS_BACKEND`, `LRS_LOG_FORMAT`)
//! 3. TOML file (`--config`, or `lrs.toml` in the working directory if present)
//! 4. Defaults (`lrs.redb`, `redb`, `text`)
//!
//! ## Example `lrs.toml`
//!
//! ```toml
//! database = "/var/lib/lrs/records.redb"
//! backend = "redb"
//! log_format = "json"
//! ```

use lrs_core::LrsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "lrs.toml";

/// Database path used when no layer sets one.
pub const DEFAULT_DATABASE: &str = "lrs.redb";

pub const ENV_DATABASE: &str = "LRS_DATABASE";
pub const ENV_BACKEND: &str = "LRS_BACKEND";
pub const ENV_LOG_FORMAT: &str = "LRS_LOG_FORMAT";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SETTING VALUES
// =============================================================================

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Volatile in-memory tables, gone when the process exits.
    Memory,
    /// ACID database file.
    #[default]
    Redb,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redb => "redb",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = LrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redb" => Ok(Self::Redb),
            other => Err(LrsError::ConfigError(format!(
                "Unknown backend: {}. Use: memory, redb",
                other
            ))),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = LrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(LrsError::ConfigError(format!(
                "Unknown log format: {}. Use: text, json",
                other
            ))),
        }
    }
}

// =============================================================================
// LAYERS
// =============================================================================

/// Contents of a TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub database: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub log_format: Option<LogFormat>,
}

impl FileConfig {
    /// Parse TOML text.
    pub fn parse(contents: &str) -> Result<Self, LrsError> {
        toml::from_str(contents).map_err(|e| LrsError::ConfigError(e.to_string()))
    }

    /// Load the config file.
    ///
    /// An explicit `path` must exist. Without one, `lrs.toml` in the working
    /// directory is read if present; otherwise every key is unset.
    pub fn load(path: Option<&Path>) -> Result<Self, LrsError> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::read(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self, LrsError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            LrsError::ConfigError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(LrsError::ConfigError(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LrsError::ConfigError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        tracing::debug!("Loaded config from {:?}", path);
        Self::parse(&contents)
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub backend: Option<String>,
    pub log_format: Option<String>,
}

// =============================================================================
// RESOLVED CONFIGURATION
// =============================================================================

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LrsConfig {
    pub database: PathBuf,
    pub backend: BackendKind,
    pub log_format: LogFormat,
}

impl Default for LrsConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            backend: BackendKind::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl LrsConfig {
    /// Merge the layers. `env` looks up one environment variable; empty
    /// values count as unset.
    pub fn layered(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
        cli: &Overrides,
    ) -> Result<Self, LrsError> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let database = cli
            .database
            .clone()
            .or_else(|| env(ENV_DATABASE).map(PathBuf::from))
            .or(file.database)
            .unwrap_or(defaults.database);

        let backend = match cli.backend.clone().or_else(|| env(ENV_BACKEND)) {
            Some(value) => value.parse()?,
            None => file.backend.unwrap_or(defaults.backend),
        };

        let log_format = match cli.log_format.clone().or_else(|| env(ENV_LOG_FORMAT)) {
            Some(value) => value.parse()?,
            None => file.log_format.unwrap_or(defaults.log_format),
        };

        Ok(Self {
            database,
            backend,
            log_format,
        })
    }

    /// Resolve against the process environment and the config file.
    pub fn resolve(config_path: Option<&Path>, cli: &Overrides) -> Result<Self, LrsError> {
        let file = FileConfig::load(config_path)?;
        Self::layered(file, |key| std::env::var(key).ok(), cli)
    }
}

// =============================================================================
// TESTS
// =============================================================================
