use pipeline_progress::models::error::{ErrorKind, ProcessingError};
use pipeline_progress::models::stage::Stage;
use pipeline_progress::AppError;

#[test]
fn app_error_display_prefixes() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(AppError::Io("disk".into()).to_string(), "io: disk");
    assert_eq!(
        AppError::Serialization("eof".into()).to_string(),
        "serialization: eof"
    );
    assert_eq!(
        AppError::UnknownStage("ocr".into()).to_string(),
        "unknown stage: ocr"
    );
    assert_eq!(
        AppError::Persistence("locked".into()).to_string(),
        "persistence: locked"
    );
}

#[test]
fn io_and_json_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
    assert!(matches!(AppError::from(io), AppError::Io(_)));

    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(AppError::from(json), AppError::Serialization(_)));
}

#[test]
fn invalid_transition_error_carries_stages() {
    let err = ProcessingError::invalid_transition(Stage::Idle, Stage::DataExtraction);
    assert_eq!(err.kind, ErrorKind::InvalidStageTransition);
    assert_eq!(err.code, "INVALID_STAGE_TRANSITION");
    assert!(!err.recoverable);
    assert!(err.ends_session());
    let details = err.details.expect("details");
    assert_eq!(details["from"], "idle");
    assert_eq!(details["to"], "data-extraction");
}

#[test]
fn timeout_error_is_terminal() {
    let err = ProcessingError::timeout(15_000);
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.code, "TIMEOUT");
    assert!(!err.recoverable);
    assert!(err.ends_session());
    assert_eq!(err.details.expect("details")["limit_ms"], 15_000);
}

#[test]
fn cancellation_not_allowed_does_not_end_session() {
    let err = ProcessingError::cancellation_not_allowed(Stage::AiAnalysis);
    assert_eq!(err.kind, ErrorKind::CancellationNotAllowed);
    assert_eq!(err.code, "CANCELLATION_NOT_ALLOWED");
    assert!(!err.ends_session());
}

#[test]
fn processing_error_display_and_details() {
    let err = ProcessingError::processing("OCR_FAILED", "engine crashed", true)
        .with_details(serde_json::json!({ "page": 2 }));
    assert_eq!(err.kind, ErrorKind::Processing);
    assert!(err.recoverable);
    assert_eq!(err.to_string(), "OCR_FAILED: engine crashed");
    assert_eq!(err.details.expect("details")["page"], 2);
}
