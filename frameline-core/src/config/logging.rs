//! Logging configuration

use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::error::{AppError, AppResult};

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(AppError::config(format!("Unknown log format: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `frameline_core=debug`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    /// Load logging configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("FRAMELINE_LOG_LEVEL") {
            config.level = level;
        }

        if let Ok(format) = std::env::var("FRAMELINE_LOG_FORMAT") {
            config.format = format.parse()?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.level.trim().is_empty() {
            return Err(AppError::config("logging.level cannot be empty"));
        }
        Ok(())
    }
}
