//! Frameline core: resilience primitives and multi-scope list persistence
//!
//! Every public operation returns [`AppResult`]; expected failures (network,
//! validation, not found) are values, never panics.

pub mod abstractions;
pub mod common;
pub mod config;
pub mod error;
pub mod lists;
pub mod observability;
pub mod patterns;
pub mod projects;
pub mod storage;

pub use error::{AppError, AppResult, ErrorCode};
