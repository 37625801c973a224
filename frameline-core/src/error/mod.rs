//! Error handling for Frameline
//!
//! Every public operation returns [`AppResult`]. Errors are built once, where
//! the failure is detected, and travel unchanged through recovery primitives,
//! repositories and the project orchestrator.
//!
//! ## Error Taxonomy
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Frameline Error Codes                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  AUTH_*        sign-in / sign-up / session                   │
//! │  DB_*          document store reads, writes, transactions    │
//! │  STORAGE_*     blob uploads and downloads                    │
//! │  NETWORK_*     timeouts, offline, open circuits              │
//! │  VALIDATION_*  input and list invariants (never retryable)   │
//! │  PAYMENT_*     card processing                               │
//! │  LOCATION_*    geocoding and permissions                     │
//! │  AGGREGATED    partial failure of independent operations     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers branch on `Ok`/`Err`, show [`AppError::user_message`] and offer a
//! retry when [`AppError::is_retryable`] is set.

pub mod boundary;
pub mod constructors;
pub mod context;
pub mod conversions;
pub mod types;

#[cfg(test)]
mod tests;

pub use boundary::catch_unexpected;
pub use context::{ErrorContext, OptionContext, ResultLogging};
pub use types::{
    AppError, AppResult, AuthCode, DatabaseCode, ErrorCode, ErrorDetail, LocationCode,
    NetworkCode, OperationFailure, PaymentCode, StorageCode, Subsystem, ValidationCode,
};
