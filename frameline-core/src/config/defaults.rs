//! Default configuration values for Frameline
//!
//! This module centralizes all default values to make them easy to find and modify.

use std::time::Duration;

// Retry defaults
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_RETRY_EXPONENTIAL: bool = true;
pub const DEFAULT_RETRY_MAX_DELAY_SECS: u64 = 30;

// Per-attempt deadline for store calls
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

// Circuit breaker defaults
pub const DEFAULT_CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_CIRCUIT_RESET_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CIRCUIT_HALF_OPEN_MAX_CALLS: u32 = 1;

// Bulkhead defaults
pub const DEFAULT_BULKHEAD_MAX_CONCURRENCY: usize = 10;

// Rate limit defaults
pub const DEFAULT_SIGN_IN_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_SIGN_IN_WINDOW_SECS: u64 = 15 * 60;
pub const DEFAULT_SIGN_IN_BLOCK_SECS: u64 = 15 * 60;
pub const DEFAULT_SIGN_UP_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_SIGN_UP_WINDOW_SECS: u64 = 60 * 60;
pub const DEFAULT_PASSWORD_RESET_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_PASSWORD_RESET_WINDOW_SECS: u64 = 60 * 60;
pub const DEFAULT_PASSWORD_RESET_BLOCK_SECS: u64 = 60 * 60;

// Storage defaults
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_DATABASE_FILE: &str = "frameline.redb";

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Helper functions for Duration creation
pub const fn duration_ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

pub const fn duration_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}
