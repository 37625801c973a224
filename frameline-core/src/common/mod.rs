//! Shared utilities used across Frameline services

pub mod rate_limiting;

pub use rate_limiting::{RateLimitConfig, RateLimiter, RateLimiterRegistry};
