//! Core error types for Frameline
//!
//! This module contains the `AppError` struct, the closed `ErrorCode` taxonomy
//! and the `AppResult` alias used by every public operation in the crate.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Subsystem that first detected a failure.
///
/// This is the discriminant of [`ErrorCode`]; matching on it is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Auth,
    Database,
    Storage,
    Network,
    Validation,
    Payment,
    Location,
    Aggregate,
    Internal,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subsystem::Auth => "auth",
            Subsystem::Database => "database",
            Subsystem::Storage => "storage",
            Subsystem::Network => "network",
            Subsystem::Validation => "validation",
            Subsystem::Payment => "payment",
            Subsystem::Location => "location",
            Subsystem::Aggregate => "aggregate",
            Subsystem::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Authentication failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthCode {
    InvalidCredentials,
    UserNotFound,
    EmailInUse,
    WeakPassword,
    SessionExpired,
    TooManyRequests,
    NetworkFailure,
    Unknown,
}

/// Document store failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseCode {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unavailable,
    ReadFailed,
    WriteFailed,
    TransactionFailed,
    VersionConflict,
    Unknown,
}

/// Blob storage failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageCode {
    UploadFailed,
    DownloadFailed,
    FileTooLarge,
    QuotaExceeded,
    NotFound,
    Unknown,
}

/// Transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkCode {
    Timeout,
    Offline,
    ServerError,
    CircuitOpen,
    Unknown,
}

/// Input and invariant violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCode {
    InvalidInput,
    RequiredField,
    InvalidFormat,
    ListFinalized,
    DuplicateItem,
    ItemNotFound,
    SchemaMismatch,
    InvalidConfig,
}

/// Payment processing failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentCode {
    CardDeclined,
    InsufficientFunds,
    InvalidCard,
    ProcessingError,
    Unknown,
}

/// Location and geocoding failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationCode {
    PermissionDenied,
    Unavailable,
    GeocodeFailed,
    InvalidAddress,
    Unknown,
}

/// Closed enumeration of every error code, grouped by subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Auth(AuthCode),
    Database(DatabaseCode),
    Storage(StorageCode),
    Network(NetworkCode),
    Validation(ValidationCode),
    Payment(PaymentCode),
    Location(LocationCode),
    Aggregated,
    Unknown,
}

impl ErrorCode {
    /// The subsystem namespace this code belongs to
    pub fn subsystem(&self) -> Subsystem {
        match self {
            ErrorCode::Auth(_) => Subsystem::Auth,
            ErrorCode::Database(_) => Subsystem::Database,
            ErrorCode::Storage(_) => Subsystem::Storage,
            ErrorCode::Network(_) => Subsystem::Network,
            ErrorCode::Validation(_) => Subsystem::Validation,
            ErrorCode::Payment(_) => Subsystem::Payment,
            ErrorCode::Location(_) => Subsystem::Location,
            ErrorCode::Aggregated => Subsystem::Aggregate,
            ErrorCode::Unknown => Subsystem::Internal,
        }
    }

    /// Wire representation, e.g. `DB_NOT_FOUND`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Auth(code) => match code {
                AuthCode::InvalidCredentials => "AUTH_INVALID_CREDENTIALS",
                AuthCode::UserNotFound => "AUTH_USER_NOT_FOUND",
                AuthCode::EmailInUse => "AUTH_EMAIL_IN_USE",
                AuthCode::WeakPassword => "AUTH_WEAK_PASSWORD",
                AuthCode::SessionExpired => "AUTH_SESSION_EXPIRED",
                AuthCode::TooManyRequests => "AUTH_TOO_MANY_REQUESTS",
                AuthCode::NetworkFailure => "AUTH_NETWORK_FAILURE",
                AuthCode::Unknown => "AUTH_UNKNOWN",
            },
            ErrorCode::Database(code) => match code {
                DatabaseCode::NotFound => "DB_NOT_FOUND",
                DatabaseCode::AlreadyExists => "DB_ALREADY_EXISTS",
                DatabaseCode::PermissionDenied => "DB_PERMISSION_DENIED",
                DatabaseCode::Unavailable => "DB_UNAVAILABLE",
                DatabaseCode::ReadFailed => "DB_READ_FAILED",
                DatabaseCode::WriteFailed => "DB_WRITE_FAILED",
                DatabaseCode::TransactionFailed => "DB_TRANSACTION_FAILED",
                DatabaseCode::VersionConflict => "DB_VERSION_CONFLICT",
                DatabaseCode::Unknown => "DB_UNKNOWN",
            },
            ErrorCode::Storage(code) => match code {
                StorageCode::UploadFailed => "STORAGE_UPLOAD_FAILED",
                StorageCode::DownloadFailed => "STORAGE_DOWNLOAD_FAILED",
                StorageCode::FileTooLarge => "STORAGE_FILE_TOO_LARGE",
                StorageCode::QuotaExceeded => "STORAGE_QUOTA_EXCEEDED",
                StorageCode::NotFound => "STORAGE_NOT_FOUND",
                StorageCode::Unknown => "STORAGE_UNKNOWN",
            },
            ErrorCode::Network(code) => match code {
                NetworkCode::Timeout => "NETWORK_TIMEOUT",
                NetworkCode::Offline => "NETWORK_OFFLINE",
                NetworkCode::ServerError => "NETWORK_SERVER_ERROR",
                NetworkCode::CircuitOpen => "NETWORK_CIRCUIT_OPEN",
                NetworkCode::Unknown => "NETWORK_UNKNOWN",
            },
            ErrorCode::Validation(code) => match code {
                ValidationCode::InvalidInput => "VALIDATION_INVALID_INPUT",
                ValidationCode::RequiredField => "VALIDATION_REQUIRED_FIELD",
                ValidationCode::InvalidFormat => "VALIDATION_INVALID_FORMAT",
                ValidationCode::ListFinalized => "VALIDATION_LIST_FINALIZED",
                ValidationCode::DuplicateItem => "VALIDATION_DUPLICATE_ITEM",
                ValidationCode::ItemNotFound => "VALIDATION_ITEM_NOT_FOUND",
                ValidationCode::SchemaMismatch => "VALIDATION_SCHEMA_MISMATCH",
                ValidationCode::InvalidConfig => "VALIDATION_INVALID_CONFIG",
            },
            ErrorCode::Payment(code) => match code {
                PaymentCode::CardDeclined => "PAYMENT_CARD_DECLINED",
                PaymentCode::InsufficientFunds => "PAYMENT_INSUFFICIENT_FUNDS",
                PaymentCode::InvalidCard => "PAYMENT_INVALID_CARD",
                PaymentCode::ProcessingError => "PAYMENT_PROCESSING_ERROR",
                PaymentCode::Unknown => "PAYMENT_UNKNOWN",
            },
            ErrorCode::Location(code) => match code {
                LocationCode::PermissionDenied => "LOCATION_PERMISSION_DENIED",
                LocationCode::Unavailable => "LOCATION_UNAVAILABLE",
                LocationCode::GeocodeFailed => "LOCATION_GEOCODE_FAILED",
                LocationCode::InvalidAddress => "LOCATION_INVALID_ADDRESS",
                LocationCode::Unknown => "LOCATION_UNKNOWN",
            },
            ErrorCode::Aggregated => "AGGREGATED_ERROR",
            ErrorCode::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Whether a failure of this kind is worth re-invoking.
    ///
    /// Consulted once, when an `AppError` is constructed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorCode::Auth(code) => matches!(code, AuthCode::NetworkFailure),
            ErrorCode::Database(code) => matches!(
                code,
                DatabaseCode::Unavailable
                    | DatabaseCode::ReadFailed
                    | DatabaseCode::WriteFailed
                    | DatabaseCode::TransactionFailed
                    | DatabaseCode::VersionConflict
            ),
            ErrorCode::Storage(code) => {
                matches!(code, StorageCode::UploadFailed | StorageCode::DownloadFailed)
            }
            ErrorCode::Network(_) => true,
            ErrorCode::Validation(_) => false,
            ErrorCode::Payment(code) => matches!(code, PaymentCode::ProcessingError),
            ErrorCode::Location(code) => {
                matches!(code, LocationCode::Unavailable | LocationCode::GeocodeFailed)
            }
            ErrorCode::Aggregated | ErrorCode::Unknown => false,
        }
    }

    /// User-safe message shown when the caller has nothing more specific
    pub fn default_user_message(&self) -> &'static str {
        match self {
            ErrorCode::Auth(code) => match code {
                AuthCode::InvalidCredentials => "The email or password is incorrect.",
                AuthCode::UserNotFound => "No account was found for that email.",
                AuthCode::EmailInUse => "An account already exists for that email.",
                AuthCode::WeakPassword => "Please choose a stronger password.",
                AuthCode::SessionExpired => "Your session has expired. Please sign in again.",
                AuthCode::TooManyRequests => "Too many attempts. Please wait and try again.",
                AuthCode::NetworkFailure => "Could not reach the sign-in service.",
                AuthCode::Unknown => "Sign-in failed. Please try again.",
            },
            ErrorCode::Database(code) => match code {
                DatabaseCode::NotFound => "The requested item could not be found.",
                DatabaseCode::AlreadyExists => "This item already exists.",
                DatabaseCode::PermissionDenied => "You do not have permission to do that.",
                DatabaseCode::VersionConflict => {
                    "This item was changed elsewhere. Please try again."
                }
                _ => "We could not save or load your data. Please try again.",
            },
            ErrorCode::Storage(code) => match code {
                StorageCode::FileTooLarge => "That file is too large.",
                StorageCode::QuotaExceeded => "Your storage is full.",
                StorageCode::NotFound => "The file could not be found.",
                _ => "The file transfer failed. Please try again.",
            },
            ErrorCode::Network(code) => match code {
                NetworkCode::Timeout => "The request took too long. Please try again.",
                NetworkCode::Offline => "You appear to be offline.",
                NetworkCode::CircuitOpen => {
                    "The service is temporarily unavailable. Please try again shortly."
                }
                _ => "A network error occurred. Please try again.",
            },
            ErrorCode::Validation(code) => match code {
                ValidationCode::ListFinalized => "This list has been finalized and is locked.",
                ValidationCode::DuplicateItem => "An item with that identifier already exists.",
                ValidationCode::ItemNotFound => "That item is no longer in the list.",
                ValidationCode::RequiredField => "Please fill in all required fields.",
                _ => "Some of the information entered is not valid.",
            },
            ErrorCode::Payment(code) => match code {
                PaymentCode::CardDeclined => "Your card was declined.",
                PaymentCode::InsufficientFunds => "Your card has insufficient funds.",
                PaymentCode::InvalidCard => "The card details are not valid.",
                _ => "The payment could not be processed.",
            },
            ErrorCode::Location(code) => match code {
                LocationCode::PermissionDenied => "Location access was denied.",
                LocationCode::InvalidAddress => "That address could not be found.",
                _ => "Location lookup failed. Please try again.",
            },
            ErrorCode::Aggregated => "Some operations did not complete.",
            ErrorCode::Unknown => "Something went wrong. Please try again.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed step inside an aggregated batch
#[derive(Debug, Clone)]
pub struct OperationFailure {
    pub operation: String,
    pub error: AppError,
}

/// Variant-specific payload attached to an error
#[derive(Debug, Clone, Default)]
pub enum ErrorDetail {
    #[default]
    None,
    /// Field name to message, used by validation and payment errors
    FieldErrors(BTreeMap<String, String>),
    /// Partial failure of a batch of independent operations
    Aggregated {
        failures: Vec<OperationFailure>,
        success_count: usize,
        failure_count: usize,
    },
}

/// Structured error returned by every public operation
///
/// Constructed once where the failure is detected; `retryable` is derived
/// from the code at that point and cannot be changed afterwards.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct AppError {
    pub(crate) code: ErrorCode,
    pub(crate) message: String,
    pub(crate) user_message: String,
    pub(crate) context: BTreeMap<String, String>,
    pub(crate) retryable: bool,
    #[source]
    pub(crate) source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) detail: ErrorDetail,
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn subsystem(&self) -> Subsystem {
        self.code.subsystem()
    }

    /// Technical message, for logs
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Message safe to show to end users
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn detail(&self) -> &ErrorDetail {
        &self.detail
    }

    /// The underlying error this one was built from, if any
    pub fn original_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Field-level messages for validation and payment errors
    pub fn field_errors(&self) -> Option<&BTreeMap<String, String>> {
        match &self.detail {
            ErrorDetail::FieldErrors(fields) => Some(fields),
            _ => None,
        }
    }

    /// Per-operation failures for aggregated errors
    pub fn failures(&self) -> &[OperationFailure] {
        match &self.detail {
            ErrorDetail::Aggregated { failures, .. } => failures,
            _ => &[],
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Database(DatabaseCode::NotFound) | ErrorCode::Storage(StorageCode::NotFound)
        )
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
