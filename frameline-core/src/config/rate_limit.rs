//! Rate limits for authentication flows

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

use super::defaults::*;
use super::parse_env;
use crate::error::{AppError, AppResult};

/// One limiter's settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitSettings {
    pub max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Cooldown once the window is exhausted; `"0s"` in files means none
    #[serde(with = "crate::config::optional_duration")]
    pub block_duration: Option<Duration>,
}

/// Limiters for sign-in, sign-up and password reset
///
/// Each table in a file only overrides the keys it names; the rest keep that
/// limiter's own defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitsConfig {
    pub sign_in: RateLimitSettings,
    pub sign_up: RateLimitSettings,
    pub password_reset: RateLimitSettings,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            sign_in: RateLimitSettings {
                max_attempts: DEFAULT_SIGN_IN_MAX_ATTEMPTS,
                window: duration_secs(DEFAULT_SIGN_IN_WINDOW_SECS),
                block_duration: Some(duration_secs(DEFAULT_SIGN_IN_BLOCK_SECS)),
            },
            sign_up: RateLimitSettings {
                max_attempts: DEFAULT_SIGN_UP_MAX_ATTEMPTS,
                window: duration_secs(DEFAULT_SIGN_UP_WINDOW_SECS),
                block_duration: None,
            },
            password_reset: RateLimitSettings {
                max_attempts: DEFAULT_PASSWORD_RESET_MAX_ATTEMPTS,
                window: duration_secs(DEFAULT_PASSWORD_RESET_WINDOW_SECS),
                block_duration: Some(duration_secs(DEFAULT_PASSWORD_RESET_BLOCK_SECS)),
            },
        }
    }
}

/// Keys present in one `[rate_limits.*]` table
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RateLimitOverrides {
    max_attempts: Option<u32>,
    #[serde(with = "humantime_serde")]
    window: Option<Duration>,
    #[serde(with = "humantime_serde")]
    block_duration: Option<Duration>,
}

impl RateLimitOverrides {
    fn apply(self, mut settings: RateLimitSettings) -> RateLimitSettings {
        if let Some(max_attempts) = self.max_attempts {
            settings.max_attempts = max_attempts;
        }
        if let Some(window) = self.window {
            settings.window = window;
        }
        if let Some(block) = self.block_duration {
            settings.block_duration = (!block.is_zero()).then_some(block);
        }
        settings
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RateLimitsOverrides {
    sign_in: RateLimitOverrides,
    sign_up: RateLimitOverrides,
    password_reset: RateLimitOverrides,
}

impl<'de> Deserialize<'de> for RateLimitsConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let overrides = RateLimitsOverrides::deserialize(deserializer)?;
        let defaults = Self::default();
        Ok(Self {
            sign_in: overrides.sign_in.apply(defaults.sign_in),
            sign_up: overrides.sign_up.apply(defaults.sign_up),
            password_reset: overrides.password_reset.apply(defaults.password_reset),
        })
    }
}

impl RateLimitsConfig {
    /// Load rate limit configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(max) = parse_env("FRAMELINE_SIGN_IN_MAX_ATTEMPTS")? {
            config.sign_in.max_attempts = max;
        }
        if let Some(max) = parse_env("FRAMELINE_SIGN_UP_MAX_ATTEMPTS")? {
            config.sign_up.max_attempts = max;
        }
        if let Some(max) = parse_env("FRAMELINE_PASSWORD_RESET_MAX_ATTEMPTS")? {
            config.password_reset.max_attempts = max;
        }

        Ok(config)
    }

    /// Validate rate limit configuration
    pub fn validate(&self) -> AppResult<()> {
        for (name, settings) in [
            ("sign_in", &self.sign_in),
            ("sign_up", &self.sign_up),
            ("password_reset", &self.password_reset),
        ] {
            if settings.max_attempts == 0 {
                return Err(AppError::config(format!(
                    "rate_limits.{}.max_attempts must be at least 1",
                    name
                )));
            }
            if settings.window.is_zero() {
                return Err(AppError::config(format!(
                    "rate_limits.{}.window must be non-zero",
                    name
                )));
            }
        }

        Ok(())
    }
}
