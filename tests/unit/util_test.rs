//! Tests for utility helpers

use estimate_admission::util::clock::now_ms;
use estimate_admission::util::serde::{new_request_id, Priority};

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(b >= a);
    assert!(a > 1_600_000_000_000);
}

#[test]
fn test_priority_ordering() {
    assert!(Priority::High > Priority::Medium);
    assert!(Priority::Medium > Priority::Low);
    assert_eq!(Priority::ALL[0], Priority::High);
    assert_eq!(Priority::Low.to_string(), "LOW");
}

#[test]
fn test_request_id_format() {
    let id = new_request_id();
    assert!(id.starts_with("req_"));
    assert_eq!(id.len(), "req_".len() + 32);
}

#[test]
fn test_init_tracing_is_idempotent() {
    estimate_admission::util::telemetry::init_tracing();
    estimate_admission::util::telemetry::init_tracing_with("debug");
}
