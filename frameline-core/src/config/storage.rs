//! Storage configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::*;
use crate::error::{AppError, AppResult};

/// Which document store backs the repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory; contents are lost on exit
    Memory,
    /// Embedded redb database file
    Redb,
}

impl std::str::FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "redb" => Ok(StorageBackend::Redb),
            other => Err(AppError::config(format!("Unknown storage backend: {}", other))),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Data directory path
    pub data_dir: PathBuf,

    /// Database file name, relative to `data_dir`
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
        }
    }
}

impl StorageConfig {
    /// Load storage configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(backend) = std::env::var("FRAMELINE_STORAGE_BACKEND") {
            config.backend = backend.parse()?;
        }

        if let Ok(dir) = std::env::var("FRAMELINE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(file) = std::env::var("FRAMELINE_DATABASE_FILE") {
            config.database_file = file;
        }

        Ok(config)
    }

    /// Validate storage configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.backend == StorageBackend::Redb {
            if self.data_dir.as_os_str().is_empty() {
                return Err(AppError::config("data_dir cannot be empty"));
            }
            if self.database_file.is_empty() {
                return Err(AppError::config("database_file cannot be empty"));
            }
        }

        Ok(())
    }

    /// Full path of the database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_storage_config_is_valid() {
        let config = StorageConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_path() {
        let config = StorageConfig::default();
        assert!(config.database_path().starts_with(&config.data_dir));
        assert!(config.database_path().ends_with(DEFAULT_DATABASE_FILE));
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("REDB".parse::<StorageBackend>().unwrap(), StorageBackend::Redb);
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }
}
