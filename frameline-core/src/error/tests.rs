//! Tests for error construction and conversions

use super::*;
use std::collections::BTreeMap;
use std::time::Duration;

#[test]
fn test_retryable_follows_code() {
    assert!(AppError::network(NetworkCode::Offline, "offline").is_retryable());
    assert!(AppError::database(DatabaseCode::WriteFailed, "write").is_retryable());
    assert!(!AppError::database(DatabaseCode::NotFound, "missing").is_retryable());
    assert!(!AppError::validation(ValidationCode::InvalidInput, "bad").is_retryable());
    assert!(!AppError::auth(AuthCode::InvalidCredentials, "nope").is_retryable());
    assert!(AppError::payment(PaymentCode::ProcessingError, "gateway").is_retryable());
    assert!(!AppError::location(LocationCode::PermissionDenied, "denied").is_retryable());
}

#[test]
fn test_codes_render_with_subsystem_prefix() {
    assert_eq!(
        ErrorCode::Database(DatabaseCode::NotFound).as_str(),
        "DB_NOT_FOUND"
    );
    assert_eq!(ErrorCode::Network(NetworkCode::Timeout).to_string(), "NETWORK_TIMEOUT");
    assert_eq!(
        ErrorCode::Validation(ValidationCode::ListFinalized).subsystem(),
        Subsystem::Validation
    );
    assert_eq!(ErrorCode::Storage(StorageCode::QuotaExceeded).subsystem(), Subsystem::Storage);
}

#[test]
fn test_user_message_is_separate_from_technical_message() {
    let err = AppError::database(DatabaseCode::Unavailable, "grpc status 14 from backend");
    assert_eq!(err.message(), "grpc status 14 from backend");
    assert!(!err.user_message().contains("grpc"));

    let err = err.with_user_message("Could not load your kit list.");
    assert_eq!(err.user_message(), "Could not load your kit list.");
    assert!(err.is_retryable());
}

#[test]
fn test_validation_field_errors() {
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), "Name is required".to_string());
    let err = AppError::validation_fields("Project input invalid", fields);

    assert_eq!(err.code(), ErrorCode::Validation(ValidationCode::InvalidInput));
    assert_eq!(
        err.field_errors().and_then(|f| f.get("name")).map(String::as_str),
        Some("Name is required")
    );
}

#[test]
fn test_payment_field_errors() {
    let mut fields = BTreeMap::new();
    fields.insert("cardNumber".to_string(), "Card number is invalid".to_string());
    let err = AppError::payment_fields(PaymentCode::InvalidCard, "card rejected", fields);

    assert_eq!(err.subsystem(), Subsystem::Payment);
    assert_eq!(err.field_errors().map(|f| f.len()), Some(1));
}

#[test]
fn test_aggregated_error_counts() {
    let failures = vec![
        OperationFailure {
            operation: "kit_list".to_string(),
            error: AppError::validation(ValidationCode::InvalidInput, "bad item"),
        },
        OperationFailure {
            operation: "task_list".to_string(),
            error: AppError::network(NetworkCode::Offline, "offline"),
        },
    ];
    let err = AppError::aggregated(failures, 2);

    assert_eq!(err.code(), ErrorCode::Aggregated);
    assert_eq!(err.failures().len(), 2);
    assert!(err.is_retryable());
    match err.detail() {
        ErrorDetail::Aggregated {
            success_count,
            failure_count,
            ..
        } => {
            assert_eq!(*success_count, 2);
            assert_eq!(*failure_count, 2);
        }
        other => panic!("unexpected detail: {:?}", other),
    }
}

#[test]
fn test_aggregated_of_permanent_failures_is_not_retryable() {
    let failures = vec![OperationFailure {
        operation: "kit_list".to_string(),
        error: AppError::validation(ValidationCode::InvalidInput, "bad item"),
    }];
    assert!(!AppError::aggregated(failures, 3).is_retryable());
}

#[test]
fn test_timeout_constructor() {
    let err = AppError::timeout("load_list", Duration::from_millis(250));
    assert_eq!(err.code(), ErrorCode::Network(NetworkCode::Timeout));
    assert!(err.is_retryable());
    assert_eq!(err.context().get("timeout_ms").map(String::as_str), Some("250"));
}

#[test]
fn test_serde_json_error_conversion() {
    fn parse() -> AppResult<u32> {
        let value: u32 = serde_json::from_str("\"not a number\"")?;
        Ok(value)
    }

    let err = parse().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Validation(ValidationCode::SchemaMismatch));
    assert!(err.original_error().is_some());
}

#[tokio::test]
async fn test_join_error_conversion() {
    async fn task_that_panics() -> u32 {
        panic!("test panic");
    }

    async fn run() -> AppResult<u32> {
        let handle = tokio::spawn(task_that_panics());
        Ok(handle.await?)
    }

    let err = run().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unknown);
    assert!(err.message().contains("Task join error"));
}
