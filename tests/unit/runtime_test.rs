//! Tests for API payloads and builders

use std::time::Duration;

use estimate_admission::builders::build_scheduler;
use estimate_admission::config::SchedulerConfig;
use estimate_admission::core::{handler_fn, EventAction, PriorityRequest, RequestStatus};
use estimate_admission::runtime::api::{
    request_status, submit_request, update_priority, CreateRequest, UpdatePriority,
};
use estimate_admission::runtime::TokioSpawner;
use estimate_admission::util::serde::Priority;
use serde_json::json;

#[test]
fn test_create_request_deserializes_wire_names() {
    let req: CreateRequest = serde_json::from_value(json!({
        "type": "file.parse",
        "priority": "HIGH",
        "data": { "file_id": 9 },
        "maxRetries": 1,
        "timeout": 5000
    }))
    .unwrap();
    assert_eq!(req.request_type, "file.parse");
    assert_eq!(req.priority, Priority::High);
    assert_eq!(req.max_retries, Some(1));
    assert_eq!(req.timeout, Some(5000));
    assert!(req.metadata.is_empty());

    let update: UpdatePriority =
        serde_json::from_value(json!({ "requestId": "req_1", "priority": "LOW" })).unwrap();
    assert_eq!(update.request_id, "req_1");
    assert_eq!(update.priority, Priority::Low);
}

#[tokio::test]
async fn test_api_round_trip_through_scheduler() {
    let cfg = SchedulerConfig::default().with_poll_interval(Duration::from_millis(10));
    let spawner = TokioSpawner::try_current().unwrap();
    let (scheduler, events) = build_scheduler(&cfg, &spawner).unwrap();
    scheduler.register_handler(
        "file.parse",
        handler_fn(|req: PriorityRequest| async move { Ok(json!({ "echo": req.payload })) }),
    );

    let accepted = submit_request(
        &scheduler,
        CreateRequest {
            request_type: "file.parse".into(),
            priority: Priority::Low,
            data: json!(1),
            max_retries: None,
            timeout: None,
            metadata: std::collections::HashMap::new(),
        },
    )
    .unwrap();
    assert_eq!(accepted.status, RequestStatus::Pending);
    assert!(update_priority(
        &scheduler,
        &UpdatePriority {
            request_id: accepted.request_id.clone(),
            priority: Priority::High,
        }
    ));

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = request_status(&scheduler, &accepted.request_id).unwrap();
        if status.status == RequestStatus::Completed {
            assert_eq!(status.priority, Priority::High);
            assert_eq!(status.result, Some(json!({ "echo": 1 })));
            break;
        }
        assert!(std::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(request_status(&scheduler, "req_unknown").is_none());
    assert_eq!(
        events.actions_for(&accepted.request_id).last(),
        Some(&EventAction::Completed)
    );

    let rejected = submit_request(
        &scheduler,
        CreateRequest {
            request_type: String::new(),
            priority: Priority::Low,
            data: json!(null),
            max_retries: None,
            timeout: None,
            metadata: std::collections::HashMap::new(),
        },
    );
    assert!(rejected.unwrap_err().contains("invalid request options"));
}
