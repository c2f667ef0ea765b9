//! Tests for error types

use std::time::Duration;

use estimate_admission::core::{BreakerError, SchedulerError};

#[test]
fn test_scheduler_error_display() {
    let err = SchedulerError::NoHandler("estimate.recalculate".into());
    assert_eq!(
        err.to_string(),
        "no handler registered for type: estimate.recalculate"
    );

    let err = SchedulerError::HandlerTimeout(Duration::from_millis(250));
    assert_eq!(err.to_string(), "handler timed out after 250ms");

    let err = SchedulerError::QueueFull("max queue size 2 reached".into());
    assert!(err.to_string().starts_with("queue full"));
}

#[test]
fn test_retryable_errors() {
    assert!(SchedulerError::Handler("boom".into()).is_retryable());
    assert!(SchedulerError::HandlerTimeout(Duration::from_secs(1)).is_retryable());
    assert!(!SchedulerError::NoHandler("x".into()).is_retryable());
    assert!(!SchedulerError::InvalidOptions("x".into()).is_retryable());
}

#[test]
fn test_breaker_error_helpers() {
    let open: BreakerError<std::io::Error> = BreakerError::Open {
        name: "deepseek".into(),
    };
    assert!(open.is_rejection());
    assert_eq!(open.to_string(), "circuit breaker `deepseek` is open");
    assert!(open.into_inner().is_none());

    let timeout: BreakerError<std::io::Error> = BreakerError::Timeout {
        name: "deepseek".into(),
        timeout: Duration::from_secs(30),
    };
    assert!(!timeout.is_rejection());
    assert!(timeout.to_string().contains("timed out after 30s"));

    let inner = BreakerError::Inner(std::io::Error::other("connection reset"));
    assert_eq!(inner.to_string(), "connection reset");
    assert_eq!(inner.into_inner().map(|e| e.to_string()).as_deref(), Some("connection reset"));
}

#[test]
fn test_breaker_error_converts_to_anyhow() {
    fn call() -> anyhow::Result<()> {
        Err::<(), _>(BreakerError::<std::io::Error>::Open {
            name: "references".into(),
        })?;
        Ok(())
    }
    let err = call().unwrap_err();
    assert!(err.to_string().contains("references"));
}
