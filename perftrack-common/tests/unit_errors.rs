use perftrack_common::{InvocationError, PerfError};

#[test]
fn test_error_display() {
    let err = PerfError::InvalidState("tracking was never started".to_string());
    assert_eq!(err.to_string(), "Invalid state: tracking was never started");
}

#[test]
fn test_error_equality() {
    let err1 = PerfError::AssertionFailed("expected 3".to_string());
    let err2 = PerfError::AssertionFailed("expected 3".to_string());
    let err3 = PerfError::AssertionFailed("expected 4".to_string());

    assert_eq!(err1, err2);
    assert_ne!(err1, err3);
}

#[test]
fn test_requirement_violation() {
    let err = PerfError::RequirementViolation("average exceeded".to_string());
    assert_eq!(err.to_string(), "Performance requirement failed: average exceeded");
}

#[test]
fn test_empty_statistics() {
    assert_eq!(PerfError::EmptyStatistics.to_string(), "No samples recorded");
}

#[test]
fn test_unexpected_is_not_wrapped() {
    let err = PerfError::from(InvocationError::Unexpected("disk on fire".to_string()));
    assert_eq!(err, PerfError::Unexpected("disk on fire".to_string()));
    assert_eq!(err.to_string(), "disk on fire");
}

#[test]
fn test_invocation_error_conversion_keeps_tag() {
    assert_eq!(
        PerfError::from(InvocationError::execution("timeout")),
        PerfError::Execution("timeout".to_string())
    );
    assert_eq!(
        PerfError::from(InvocationError::Assertion("1 != 2".to_string())),
        PerfError::AssertionFailed("1 != 2".to_string())
    );
}

#[test]
fn test_assertion_found_in_cause_chain() {
    let nested = InvocationError::caused_by(
        "outer",
        InvocationError::caused_by("middle", InvocationError::Assertion("inner".to_string())),
    );
    assert!(nested.is_assertion());
    assert_eq!(nested.assertion_message(), Some("inner"));
    assert_eq!(nested.to_failure(), PerfError::AssertionFailed("inner".to_string()));
}

#[test]
fn test_execution_without_assertion_reraised_as_execution() {
    let err = InvocationError::caused_by("outer", InvocationError::Unexpected("io".to_string()));
    assert!(!err.is_assertion());
    assert_eq!(err.to_failure(), PerfError::Execution("outer".to_string()));
}
