//! Configuration management for daybook.
//!
//! Configuration can be set via environment variables:
//! - `TASKS_STORE` - Optional. `sqlite` (default, alias `db`) or `memory`.
//! - `TASKS_DATA_DIR` - Optional. Directory holding the task database.
//!   Defaults to `.daybook` under the current directory.
//!
//! Log filtering uses the standard `RUST_LOG` variable.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreType;

/// Default data directory name, relative to the current directory.
pub const DEFAULT_DATA_DIR: &str = ".daybook";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Storage backend
    pub store_type: StoreType,

    /// Directory for the SQLite database
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `TASKS_STORE` names an
    /// unknown backend.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_type = match lookup("TASKS_STORE") {
            Some(value) => StoreType::parse(&value).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "TASKS_STORE".to_string(),
                    format!("unknown store '{}' (expected sqlite or memory)", value),
                )
            })?,
            None => StoreType::default(),
        };

        let data_dir = lookup("TASKS_DATA_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(DEFAULT_DATA_DIR)
            });

        Ok(Self {
            store_type,
            data_dir,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            store_type: StoreType::default(),
            data_dir,
        }
    }
}
