//! Conversions from library errors into `AppError`
//!
//! Each conversion decides the code (and so the retryability) at the point the
//! foreign error enters the crate.

use super::types::*;

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::validation(
            ValidationCode::SchemaMismatch,
            format!("Document does not match the expected shape: {}", err),
        )
        .with_source(err)
    }
}

impl From<redb::Error> for AppError {
    fn from(err: redb::Error) -> Self {
        AppError::database(DatabaseCode::Unavailable, format!("Storage error: {}", err))
            .with_source(err)
    }
}

impl From<redb::DatabaseError> for AppError {
    fn from(err: redb::DatabaseError) -> Self {
        AppError::database(
            DatabaseCode::Unavailable,
            format!("Failed to open database: {}", err),
        )
        .with_source(err)
    }
}

impl From<redb::TransactionError> for AppError {
    fn from(err: redb::TransactionError) -> Self {
        AppError::database(
            DatabaseCode::TransactionFailed,
            format!("Storage transaction error: {}", err),
        )
        .with_source(err)
    }
}

impl From<redb::TableError> for AppError {
    fn from(err: redb::TableError) -> Self {
        AppError::database(
            DatabaseCode::ReadFailed,
            format!("Storage table error: {}", err),
        )
        .with_source(err)
    }
}

impl From<redb::StorageError> for AppError {
    fn from(err: redb::StorageError) -> Self {
        AppError::database(DatabaseCode::Unavailable, format!("Storage error: {}", err))
            .with_source(err)
    }
}

impl From<redb::CommitError> for AppError {
    fn from(err: redb::CommitError) -> Self {
        AppError::database(
            DatabaseCode::WriteFailed,
            format!("Storage commit error: {}", err),
        )
        .with_source(err)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::unknown(format!("Task join error: {}", err)).with_source(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::database(DatabaseCode::Unavailable, format!("IO error: {}", err))
            .with_source(err)
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::config(format!("Failed to parse configuration: {}", err)).with_source(err)
    }
}
