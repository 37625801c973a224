//! Configuration module for Frameline
//!
//! Configuration comes from defaults, a TOML file, or `FRAMELINE_*`
//! environment variables, and is validated before use. Durations in files are
//! humantime strings (`"250ms"`, `"15m"`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

pub mod defaults;
pub mod logging;
pub mod rate_limit;
pub mod resilience;
pub mod storage;

pub use defaults::*;
pub use logging::{LogFormat, LoggingConfig};
pub use rate_limit::{RateLimitSettings, RateLimitsConfig};
pub use resilience::{BulkheadSettings, CircuitBreakerSettings, ResilienceConfig, RetrySettings};
pub use storage::{StorageBackend, StorageConfig};

/// Root configuration structure for Frameline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramelineConfig {
    /// Retry, timeout, circuit breaker and bulkhead settings for store calls
    pub resilience: ResilienceConfig,

    /// Authentication rate limits
    pub rate_limits: RateLimitsConfig,

    /// Document store selection
    pub storage: StorageConfig,

    /// Log level and format
    pub logging: LoggingConfig,
}

impl FramelineConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Failed to read config file {}: {}", path.display(), e))
                .with_source(e)
        })?;
        Self::from_toml_str(&contents).map_err(|e| e.with_context("path", path.display().to_string()))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let config = Self {
            resilience: ResilienceConfig::from_env()?,
            rate_limits: RateLimitsConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> AppResult<()> {
        self.resilience.validate()?;
        self.rate_limits.validate()?;
        self.storage.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AppError::config(format!("Failed to serialize configuration: {}", e)))
    }

    /// Configuration for tests: in-memory storage, no delays worth waiting on
    pub fn test() -> Self {
        let mut config = Self::default();
        config.resilience.retry.delay = Duration::from_millis(1);
        config.resilience.retry.max_delay = Some(Duration::from_millis(10));
        config.resilience.timeout = Some(Duration::from_secs(1));
        config.storage.backend = StorageBackend::Memory;
        config.logging.level = "debug".to_string();
        config
    }
}

/// Builder for FramelineConfig
pub struct FramelineConfigBuilder {
    config: FramelineConfig,
}

impl FramelineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FramelineConfig::default(),
        }
    }

    pub fn resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.config.resilience = resilience;
        self
    }

    pub fn rate_limits(mut self, rate_limits: RateLimitsConfig) -> Self {
        self.config.rate_limits = rate_limits;
        self
    }

    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    pub fn retry_attempts(mut self, max_attempts: u32) -> Self {
        self.config.resilience.retry.max_attempts = max_attempts;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.resilience.timeout = timeout;
        self
    }

    pub fn build(self) -> AppResult<FramelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for FramelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an environment variable, `None` when unset
pub(crate) fn parse_env<T: FromStr>(key: &str) -> AppResult<Option<T>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::config(format!("Invalid {}", key))),
        Err(_) => Ok(None),
    }
}

/// Parse a millisecond duration from the environment
pub(crate) fn parse_duration_from_env(key: &str) -> AppResult<Option<Duration>> {
    Ok(parse_env::<u64>(key)?.map(Duration::from_millis))
}

/// Parse a duration in whole seconds from the environment
pub(crate) fn parse_duration_secs_from_env(key: &str) -> AppResult<Option<Duration>> {
    Ok(parse_env::<u64>(key)?.map(Duration::from_secs))
}

/// Humantime encoding for optional durations where `"0s"` means off
///
/// TOML has no null, so a disabled layer is written as a zero duration.
pub(crate) mod optional_duration {
    use serde::{Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime_serde::serialize(&value.unwrap_or(Duration::ZERO), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let duration: Duration = humantime_serde::deserialize(deserializer)?;
        Ok((!duration.is_zero()).then_some(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, ValidationCode};

    #[test]
    fn test_default_config_validation() {
        let config = FramelineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = FramelineConfigBuilder::new()
            .retry_attempts(7)
            .timeout(None)
            .build()
            .unwrap();

        assert_eq!(config.resilience.retry.max_attempts, 7);
        assert_eq!(config.resilience.timeout, None);
    }

    #[test]
    fn test_invalid_config() {
        let result = FramelineConfigBuilder::new().retry_attempts(0).build();
        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation(ValidationCode::InvalidConfig));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FramelineConfig::from_toml_str(
            r#"
            [resilience.retry]
            max_attempts = 5
            delay = "250ms"

            [rate_limits.sign_in]
            max_attempts = 3
            window = "10m"
            block_duration = "30m"
            "#,
        )
        .unwrap();

        assert_eq!(config.resilience.retry.max_attempts, 5);
        assert_eq!(config.resilience.retry.delay, Duration::from_millis(250));
        assert_eq!(
            config.resilience.circuit_breaker.failure_threshold,
            DEFAULT_CIRCUIT_FAILURE_THRESHOLD
        );
        assert_eq!(config.rate_limits.sign_in.window, Duration::from_secs(600));
        assert_eq!(
            config.rate_limits.sign_in.block_duration,
            Some(Duration::from_secs(1800))
        );
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = FramelineConfig::from_toml_str("resilience = 3").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation(ValidationCode::InvalidConfig));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = FramelineConfig::test();
        let rendered = config.to_toml_string().unwrap();
        let parsed = FramelineConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_disabled_durations_survive_round_trip() {
        let mut config = FramelineConfig::test();
        config.resilience.timeout = None;
        config.resilience.retry.max_delay = None;
        config.rate_limits.sign_in.block_duration = None;

        let rendered = config.to_toml_string().unwrap();
        let parsed = FramelineConfig::from_toml_str(&rendered).unwrap();

        assert_eq!(parsed.resilience.timeout, None);
        assert_eq!(parsed.resilience.retry.max_delay, None);
        assert_eq!(parsed.rate_limits.sign_in.block_duration, None);
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_zero_duration_disables_layer() {
        let config = FramelineConfig::from_toml_str(
            r#"
            [resilience]
            timeout = "0s"

            [rate_limits.password_reset]
            block_duration = "0s"
            "#,
        )
        .unwrap();

        assert_eq!(config.resilience.timeout, None);
        assert_eq!(config.rate_limits.password_reset.block_duration, None);
        assert_eq!(
            config.rate_limits.password_reset.max_attempts,
            DEFAULT_PASSWORD_RESET_MAX_ATTEMPTS
        );
    }

    #[test]
    fn test_partial_limiter_table_keeps_its_own_defaults() {
        let config = FramelineConfig::from_toml_str(
            r#"
            [rate_limits.sign_in]
            max_attempts = 2

            [rate_limits.sign_up]
            window = "5m"
            "#,
        )
        .unwrap();

        let defaults = RateLimitsConfig::default();
        assert_eq!(config.rate_limits.sign_in.max_attempts, 2);
        assert_eq!(config.rate_limits.sign_in.window, defaults.sign_in.window);
        assert_eq!(
            config.rate_limits.sign_in.block_duration,
            Some(Duration::from_secs(DEFAULT_SIGN_IN_BLOCK_SECS))
        );
        assert_eq!(config.rate_limits.sign_up.window, Duration::from_secs(300));
        assert_eq!(config.rate_limits.sign_up.max_attempts, DEFAULT_SIGN_UP_MAX_ATTEMPTS);
        assert_eq!(config.rate_limits.sign_up.block_duration, None);
    }
}
