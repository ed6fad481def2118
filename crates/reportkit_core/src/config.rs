//! TOML configuration for the report engine.
//!
//! Every field has a default, so an empty file (or no file) is valid.
//!
//! ```toml
//! [storage]
//! db_path = "/var/lib/reportkit/reports.sqlite3"
//! busy_timeout_ms = 5000
//!
//! [logging]
//! level = "info"
//! dir = "/var/log/reportkit"
//!
//! [materialize]
//! active_only = false
//! max_pairs_per_table = 250000
//!
//! [lifecycle]
//! status_policy = "unrestricted"   # or "forward_only"
//! ```

use crate::db::DEFAULT_BUSY_TIMEOUT_MS;
use crate::logging::{default_log_level, normalize_level};
use crate::model::report::StatusPolicy;
use crate::service::materializer::MaterializeOptions;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_DB_FILE_NAME: &str = "reportkit.sqlite3";

/// Configuration load/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportkitConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub materialize: MaterializeOptions,
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE_NAME),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// File logging settings. Logging stays off while `dir` is unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub status_policy: StatusPolicy,
}

impl ReportkitConfig {
    /// Reads, parses and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.db_path must not be empty".into()));
        }
        if self.storage.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "storage.busy_timeout_ms must be greater than 0".into(),
            ));
        }
        normalize_level(&self.logging.level)
            .map_err(|message| ConfigError::Invalid(format!("logging.level: {message}")))?;
        if let Some(dir) = &self.logging.dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "logging.dir must be an absolute path, got `{}`",
                    dir.display()
                )));
            }
        }
        if self.materialize.max_pairs_per_table == Some(0) {
            return Err(ConfigError::Invalid(
                "materialize.max_pairs_per_table must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
