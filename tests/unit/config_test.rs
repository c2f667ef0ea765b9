//! Tests for configuration validation

use std::time::Duration;

use estimate_admission::config::{BreakerConfig, RegistryConfig, SchedulerConfig};

#[test]
fn test_scheduler_config_defaults() {
    let cfg = SchedulerConfig::default();
    assert_eq!(cfg.poll_interval(), Duration::from_millis(100));
    assert_eq!(cfg.default_max_retries, 3);
    assert_eq!(cfg.max_retries_ceiling, 100);
    assert!(cfg.max_queue_size.is_none());
    assert!(cfg.default_timeout_ms.is_none());
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_scheduler_config_invalid_values() {
    let zero_poll = SchedulerConfig {
        poll_interval_ms: 0,
        ..SchedulerConfig::default()
    };
    assert!(zero_poll.validate().is_err());

    let retries_over_ceiling = SchedulerConfig::default().with_default_max_retries(101);
    assert!(retries_over_ceiling.validate().is_err());

    let zero_queue = SchedulerConfig {
        max_queue_size: Some(0),
        ..SchedulerConfig::default()
    };
    assert!(zero_queue.validate().is_err());

    let zero_timeout = SchedulerConfig::default().with_default_timeout(Duration::ZERO);
    assert!(zero_timeout.validate().is_err());
}

#[test]
fn test_scheduler_config_from_json() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{ "poll_interval_ms": 25, "max_queue_size": 500, "default_timeout_ms": 30000 }"#,
    )
    .unwrap();
    assert_eq!(cfg.poll_interval_ms, 25);
    assert_eq!(cfg.max_queue_size, Some(500));
    assert_eq!(cfg.default_timeout_ms, Some(30_000));
    assert_eq!(cfg.default_max_retries, 3);

    assert!(SchedulerConfig::from_json_str(r#"{ "poll_interval_ms": 0 }"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_breaker_config_validation() {
    assert!(BreakerConfig::default().validate().is_ok());
    assert!(BreakerConfig::default()
        .with_failure_threshold(0)
        .validate()
        .is_err());
    assert!(BreakerConfig::default()
        .with_timeout(Duration::ZERO)
        .validate()
        .is_err());
    assert!(BreakerConfig::default()
        .with_error_threshold_percentage(150.0)
        .validate()
        .is_err());
}

#[test]
fn test_breaker_config_from_json_fills_defaults() {
    let cfg = BreakerConfig::from_json_str(r#"{ "failure_threshold": 3, "timeout_ms": 500 }"#)
        .unwrap();
    assert_eq!(cfg.failure_threshold, 3);
    assert_eq!(cfg.timeout(), Duration::from_millis(500));
    assert_eq!(cfg.volume_threshold, 10);
    assert_eq!(cfg.half_open_requests, 3);
}

#[test]
fn test_registry_config_from_json() {
    let cfg = RegistryConfig::from_json_str(
        r#"{
            "defaults": { "failure_threshold": 5 },
            "services": {
                "deepseek": { "timeout_ms": 30000, "reset_timeout_ms": 60000 },
                "huggingface": { "timeout_ms": 60000, "reset_timeout_ms": 120000 }
            }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.for_service("huggingface").timeout_ms, 60_000);
    assert_eq!(cfg.for_service("unlisted"), &cfg.defaults);

    let invalid = r#"{ "services": { "deepseek": { "half_open_requests": 0 } } }"#;
    let err = RegistryConfig::from_json_str(invalid).unwrap_err();
    assert!(err.contains("deepseek"));
}
