//! Tests for error types

use anyhow::anyhow;
use prometheus_jobs::core::JobError;

#[test]
fn test_job_does_not_exist_error() {
    let err = JobError::JobDoesNotExist("add".to_string());
    assert_eq!(format!("{}", err), "job `add` does not exist");
}

#[test]
fn test_invalid_type_error() {
    let err = JobError::JobHandlerIsOfInvalidType {
        job: "sum".to_string(),
        expected: "math".to_string(),
    };
    assert_eq!(
        format!("{}", err),
        "job `sum` cannot be used as default for type `math`"
    );
}

#[test]
fn test_validation_errors_are_joined() {
    let err = JobError::JobInputSchemaValidationError(vec![
        "/0: expected number, found string".to_string(),
        "/1: expected number, found null".to_string(),
    ]);
    assert_eq!(
        format!("{}", err),
        "job input failed schema validation: /0: expected number, found string; /1: expected number, found null"
    );
}

#[test]
fn test_handler_error_passes_message_through() {
    let err = JobError::handler(anyhow!("model unavailable"));
    assert_eq!(format!("{}", err), "model unavailable");
    assert!(err.handler_error().is_some());

    let cloned = err.clone();
    assert_eq!(cloned.to_string(), err.to_string());
    assert!(JobError::Config("x".into()).handler_error().is_none());
}

#[test]
fn test_serde_error_conversion() {
    let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err = JobError::from(parse);
    assert!(matches!(err, JobError::Serialization(_)));
}
