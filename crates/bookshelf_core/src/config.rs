//! Process configuration resolved from environment variables.
//!
//! # Responsibility
//! - Resolve store paths, index name, logging and request timeout settings.
//! - Reject malformed values up front instead of failing on first request.
//!
//! # Invariants
//! - Every setting has a default except the log directory, which disables
//!   file logging when unset.

use crate::context::RequestContext;
use crate::logging::{default_log_level, normalize_level};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "BOOKSHELF_DB_PATH";
pub const ENV_INDEX_PATH: &str = "BOOKSHELF_INDEX_PATH";
pub const ENV_INDEX_NAME: &str = "BOOKSHELF_INDEX_NAME";
pub const ENV_LOG_LEVEL: &str = "BOOKSHELF_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "BOOKSHELF_LOG_DIR";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "BOOKSHELF_REQUEST_TIMEOUT_MS";

const DEFAULT_DB_PATH: &str = "bookshelf.sqlite3";
const DEFAULT_INDEX_PATH: &str = "bookshelf_index.sqlite3";
const DEFAULT_INDEX_NAME: &str = "books";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid value `{}` for {}: {}",
            self.value, self.key, self.reason
        )
    }
}

impl Error for ConfigError {}

/// Resolved core settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub index_path: PathBuf,
    pub index_name: String,
    pub log_level: &'static str,
    pub log_dir: Option<PathBuf>,
    pub request_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            log_level: default_log_level(),
            log_dir: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl CoreConfig {
    /// Resolves settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(value) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(value);
        }
        if let Some(value) = read(ENV_INDEX_PATH) {
            config.index_path = PathBuf::from(value);
        }
        if let Some(value) = read(ENV_INDEX_NAME) {
            config.index_name = value;
        }
        if let Some(value) = read(ENV_LOG_LEVEL) {
            config.log_level = normalize_level(&value).map_err(|reason| ConfigError {
                key: ENV_LOG_LEVEL,
                value: value.clone(),
                reason,
            })?;
        }
        if let Some(value) = read(ENV_LOG_DIR) {
            let path = PathBuf::from(&value);
            if !path.is_absolute() {
                return Err(ConfigError {
                    key: ENV_LOG_DIR,
                    value,
                    reason: "log directory must be an absolute path".to_string(),
                });
            }
            config.log_dir = Some(path);
        }
        if let Some(value) = read(ENV_REQUEST_TIMEOUT_MS) {
            let millis = value
                .parse::<u64>()
                .ok()
                .filter(|millis| *millis > 0)
                .ok_or_else(|| ConfigError {
                    key: ENV_REQUEST_TIMEOUT_MS,
                    value: value.clone(),
                    reason: "expected a positive number of milliseconds".to_string(),
                })?;
            config.request_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Fresh context bounded by the configured request timeout.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout)
    }
}
