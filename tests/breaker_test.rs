//! Integration tests for the circuit breaker state machine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use estimate_admission::config::BreakerConfig;
use estimate_admission::core::{BreakerError, CircuitBreaker, CircuitState};
use futures::future::join_all;

#[derive(Debug, PartialEq, Eq)]
struct ProviderDown;

impl std::fmt::Display for ProviderDown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("provider down")
    }
}

fn config() -> BreakerConfig {
    BreakerConfig::default()
        .with_failure_threshold(3)
        .with_volume_threshold(3)
        .with_reset_timeout(Duration::from_millis(100))
        .with_half_open_requests(1)
        .with_timeout(Duration::from_millis(500))
}

async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<ProviderDown>> {
    breaker.execute(|| async { Err::<(), _>(ProviderDown) }).await
}

async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<ProviderDown>> {
    breaker.execute(|| async { Ok::<_, ProviderDown>(7) }).await
}

#[tokio::test]
async fn test_opens_once_volume_and_failures_reached() {
    let breaker = CircuitBreaker::new("deepseek", config()).unwrap();

    assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner(ProviderDown))));
    assert!(fail(&breaker).await.is_err());
    assert_eq!(breaker.state(), CircuitState::Closed);

    assert!(fail(&breaker).await.is_err());
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!breaker.is_available());
}

#[tokio::test]
async fn test_stays_closed_below_volume_threshold() {
    let breaker = CircuitBreaker::new(
        "huggingface",
        config().with_failure_threshold(1).with_volume_threshold(5),
    )
    .unwrap();
    for _ in 0..4 {
        assert!(fail(&breaker).await.is_err());
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(fail(&breaker).await.is_err());
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_opens_on_error_percentage() {
    let breaker = CircuitBreaker::new(
        "grandsmeta",
        config()
            .with_failure_threshold(100)
            .with_volume_threshold(4)
            .with_error_threshold_percentage(50.0),
    )
    .unwrap();
    succeed(&breaker).await.unwrap();
    succeed(&breaker).await.unwrap();
    assert!(fail(&breaker).await.is_err());
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(fail(&breaker).await.is_err());
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn test_open_rejects_without_invoking() {
    let breaker = CircuitBreaker::new("references", config()).unwrap();
    breaker.force_open();

    let invoked = AtomicU32::new(0);
    let result = breaker
        .execute(|| async {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ProviderDown>(())
        })
        .await;

    match result {
        Err(err @ BreakerError::Open { .. }) => {
            assert!(err.is_rejection());
            assert!(err.to_string().contains("references"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(breaker.metrics().rejected_requests, 1);
    assert_eq!(breaker.metrics().total_requests, 0);
}

#[tokio::test]
async fn test_failing_probe_reopens() {
    let breaker = CircuitBreaker::new("deepseek", config()).unwrap();
    for _ in 0..3 {
        let _ = fail(&breaker).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(breaker.is_available());
    assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner(_))));
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(matches!(succeed(&breaker).await, Err(BreakerError::Open { .. })));
}

#[tokio::test]
async fn test_recovery_scenario() {
    let breaker = CircuitBreaker::new(
        "deepseek",
        BreakerConfig::default()
            .with_failure_threshold(3)
            .with_volume_threshold(3)
            .with_reset_timeout(Duration::from_millis(1000))
            .with_timeout(Duration::from_millis(500))
            .with_half_open_requests(1),
    )
    .unwrap();

    for _ in 0..3 {
        assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner(_))));
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(matches!(succeed(&breaker).await, Err(BreakerError::Open { .. })));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(succeed(&breaker).await.unwrap(), 7);
    assert_eq!(breaker.state(), CircuitState::Closed);

    let metrics = breaker.metrics();
    assert_eq!(metrics.failed_requests, 0, "window is cleared on close");
    assert_eq!(metrics.total_failures, 3);
    assert_eq!(metrics.rejected_requests, 1);
    assert!(metrics.last_success_time_ms.is_some());
}

#[tokio::test]
async fn test_half_open_needs_enough_successful_probes() {
    let breaker = CircuitBreaker::new("deepseek", config().with_half_open_requests(3)).unwrap();
    for _ in 0..3 {
        let _ = fail(&breaker).await;
    }
    tokio::time::sleep(Duration::from_millis(120)).await;

    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_concurrent_probes_are_limited() {
    let breaker = Arc::new(
        CircuitBreaker::new("deepseek", config().with_half_open_requests(2)).unwrap(),
    );
    for _ in 0..3 {
        let _ = fail(&breaker).await;
    }
    tokio::time::sleep(Duration::from_millis(120)).await;

    let invoked = Arc::new(AtomicU32::new(0));
    let calls = (0..5).map(|_| {
        let breaker = Arc::clone(&breaker);
        let invoked = Arc::clone(&invoked);
        async move {
            breaker
                .execute(|| async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, ProviderDown>(())
                })
                .await
        }
    });
    let results = join_all(calls).await;

    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(BreakerError::Open { .. })))
        .count();
    assert_eq!(invoked.load(Ordering::SeqCst), 2);
    assert_eq!(rejected, 3);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_timeout_reported_promptly_and_counted_once() {
    let breaker = CircuitBreaker::new(
        "slow-provider",
        config().with_timeout(Duration::from_millis(50)),
    )
    .unwrap();

    let started = Instant::now();
    let result = breaker
        .execute(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<_, ProviderDown>(())
        })
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(BreakerError::Timeout { .. })));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(300), "took {elapsed:?}");

    let metrics = breaker.metrics();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.total_failures, 1);
    assert_eq!(metrics.failed_requests, 1);
}

#[tokio::test]
async fn test_probe_slot_released_after_timeout() {
    let breaker = CircuitBreaker::new(
        "slow-provider",
        config().with_timeout(Duration::from_millis(30)),
    )
    .unwrap();
    for _ in 0..3 {
        let _ = fail(&breaker).await;
    }
    tokio::time::sleep(Duration::from_millis(120)).await;

    let result = breaker
        .execute(|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ProviderDown>(())
        })
        .await;
    assert!(matches!(result, Err(BreakerError::Timeout { .. })));
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(120)).await;
    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_reset_and_force_open() {
    let breaker = CircuitBreaker::new("deepseek", config()).unwrap();
    succeed(&breaker).await.unwrap();
    let _ = fail(&breaker).await;

    breaker.force_open();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.metrics().total_requests, 2, "force_open keeps counters");

    breaker.reset();
    let metrics = breaker.metrics();
    assert_eq!(metrics.current_state, CircuitState::Closed);
    assert_eq!(metrics.total_requests, 0);
    assert_eq!(metrics.total_failures, 0);
    assert_eq!(metrics.failed_requests, 0);
    assert!(metrics.last_failure_time_ms.is_none());
    assert!(breaker.is_available());
}

#[tokio::test]
async fn test_metrics_error_rate() {
    let breaker = CircuitBreaker::new("references", config().with_volume_threshold(100)).unwrap();
    succeed(&breaker).await.unwrap();
    let _ = fail(&breaker).await;
    let _ = fail(&breaker).await;
    succeed(&breaker).await.unwrap();

    let metrics = breaker.metrics();
    assert_eq!(metrics.total_requests, 4);
    assert_eq!(metrics.successful_requests, 2);
    assert_eq!(metrics.failed_requests, 2);
    assert!((metrics.error_rate - 50.0).abs() < f64::EPSILON);
    assert_eq!(breaker.name(), "references");
    assert_eq!(breaker.config().volume_threshold, 100);
}

#[tokio::test]
async fn test_window_forgets_old_failures() {
    let breaker = CircuitBreaker::new(
        "deepseek",
        config().with_monitoring_period(Duration::from_millis(60)),
    )
    .unwrap();
    let _ = fail(&breaker).await;
    let _ = fail(&breaker).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(breaker.metrics().failed_requests, 0);
    let _ = fail(&breaker).await;
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    for invalid in [
        config().with_half_open_requests(0),
        config().with_timeout(Duration::ZERO),
        config().with_reset_timeout(Duration::ZERO),
        config().with_failure_threshold(0),
    ] {
        let err = CircuitBreaker::new("deepseek", invalid).unwrap_err();
        assert!(err.contains("deepseek"), "unexpected message: {err}");
    }
}
