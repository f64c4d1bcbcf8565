/*!
 * Tests for error types and their retry classification
 */

use std::time::Duration;

use mtpe::errors::{DocumentError, FailureKind, PipelineError, ProviderError, StoreError};

/// Test transient failures are retried
#[test]
fn test_kind_transientFailures_shouldBeTransient() {
    let transient = [
        ProviderError::ConnectionError("reset".to_string()),
        ProviderError::RateLimitExceeded("slow down".to_string()),
        ProviderError::Timeout(Duration::from_secs(3)),
        ProviderError::MisalignedBatch { expected: 3, actual: 2 },
        ProviderError::ApiError {
            status_code: 503,
            message: "unavailable".to_string(),
        },
        ProviderError::ApiError {
            status_code: 429,
            message: "busy".to_string(),
        },
    ];
    for error in transient {
        assert_eq!(error.kind(), FailureKind::Transient, "{}", error);
    }
}

/// Test permanent failures are not retried
#[test]
fn test_kind_permanentFailures_shouldBePermanent() {
    let permanent = [
        ProviderError::AuthenticationError("bad key".to_string()),
        ProviderError::InvalidInput("too long".to_string()),
        ProviderError::ApiError {
            status_code: 400,
            message: "bad request".to_string(),
        },
    ];
    for error in permanent {
        assert!(!error.is_transient(), "{}", error);
    }
}

/// Test error messages carry their details
#[test]
fn test_display_shouldIncludeDetails() {
    let error = ProviderError::MisalignedBatch { expected: 3, actual: 2 };
    assert!(error.to_string().contains("sent 3"));

    let error = StoreError::Corrupt {
        path: "tm.json".into(),
        reason: "EOF".to_string(),
    };
    assert!(error.to_string().contains("tm.json"));
}

/// Test conversions into the run-level error
#[test]
fn test_pipelineError_fromLowerLevels_shouldWrap() {
    let error: PipelineError = DocumentError::MissingSegment(4).into();
    assert!(matches!(error, PipelineError::Document(_)));

    let error: PipelineError = StoreError::Serialize("oops".to_string()).into();
    assert!(error.to_string().contains("oops"));
}
