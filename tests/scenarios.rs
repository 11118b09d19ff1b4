//! End-to-end scenarios from spec §8: fast path, throttle, debounce
//! trailing, change detection, scheduled repeat, branch isolation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cyre::{handler_fn, ActionConfig, Cyre, HandlerResult, MockClock, Payload};
use serde_json::json;

#[tokio::test]
async fn scenario_1_fast_path_round_trips_payload() {
    let bus = Cyre::new();
    bus.action(ActionConfig::new("a")).await.unwrap();
    bus.on("a", handler_fn(|p| async move { HandlerResult::Value(p) }))
        .await
        .unwrap();

    let response = bus.call("a", Some(Payload::from(json!(1)))).await;
    assert!(response.ok);
    assert_eq!(response.payload, Payload::from(json!(1)));

    let calls = bus.get_metric_counters().calls;
    let executions = bus.get_metric_counters().executions;
    assert_eq!(calls, 1);
    assert_eq!(executions, 1);
}

#[tokio::test]
async fn scenario_2_throttle_admits_one_of_three_rapid_calls() {
    let clock = Arc::new(MockClock::new());
    let bus = Cyre::with_clock(clock.clone());
    let count = Arc::new(AtomicU32::new(0));

    bus.action(ActionConfig::new("b").with_throttle(100))
        .await
        .unwrap();
    {
        let count = count.clone();
        bus.on(
            "b",
            handler_fn(move |p| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    HandlerResult::Value(p)
                }
            }),
        )
        .await
        .unwrap();
    }

    let first = bus.call("b", Some(Payload::from(json!(1)))).await;
    assert!(first.ok);

    clock.advance(Duration::from_millis(10));
    let second = bus.call("b", Some(Payload::from(json!(2)))).await;
    assert!(!second.ok);
    assert_eq!(second.metadata.reason.as_deref(), Some("throttled"));

    clock.advance(Duration::from_millis(10));
    let third = bus.call("b", Some(Payload::from(json!(3)))).await;
    assert!(!third.ok);

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scenario_3_debounce_fires_once_with_latest_payload() {
    let clock = Arc::new(MockClock::new());
    let bus = Cyre::with_clock(clock.clone());
    let last_seen = Arc::new(std::sync::Mutex::new(None));

    bus.action(ActionConfig::new("c").with_debounce(50))
        .await
        .unwrap();
    {
        let last_seen = last_seen.clone();
        bus.on(
            "c",
            handler_fn(move |p| {
                let last_seen = last_seen.clone();
                async move {
                    *last_seen.lock().unwrap() = Some(p.clone());
                    HandlerResult::Value(p)
                }
            }),
        )
        .await
        .unwrap();
    }

    for (delta, value) in [(0u64, 1), (10, 2), (20, 3)] {
        clock.advance(Duration::from_millis(delta));
        let response = bus.call("c", Some(Payload::from(json!(value)))).await;
        assert!(response.ok);
        assert_eq!(response.message, "debounced");
    }

    clock.advance(Duration::from_millis(70));
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        *last_seen.lock().unwrap(),
        Some(Payload::from(json!(3))),
        "debounce must fire once, with the latest payload"
    );
}

#[tokio::test]
async fn scenario_4_change_detection_skips_identical_payloads() {
    let bus = Cyre::new();
    bus.action(ActionConfig::new("d").with_detect_changes(true))
        .await
        .unwrap();
    bus.on("d", handler_fn(|p| async move { HandlerResult::Value(p) }))
        .await
        .unwrap();

    let first = bus.call("d", Some(Payload::from(json!({"v": 1})))).await;
    assert!(first.ok);

    let second = bus.call("d", Some(Payload::from(json!({"v": 1})))).await;
    assert!(second.ok);
    assert_eq!(second.message, "skipped: no changes");

    let third = bus.call("d", Some(Payload::from(json!({"v": 2})))).await;
    assert!(third.ok);
    assert_ne!(third.message, "skipped: no changes");

    assert_eq!(bus.get_metric_counters().executions, 2);
}

#[tokio::test]
async fn scenario_5_scheduled_repeat_fires_requested_count() {
    let clock = Arc::new(MockClock::new());
    let bus = Cyre::with_clock(clock.clone());
    let count = Arc::new(AtomicU32::new(0));

    bus.action(
        ActionConfig::new("e")
            .with_interval(20)
            .with_repeat(3u32),
    )
    .await
    .unwrap();
    {
        let count = count.clone();
        bus.on(
            "e",
            handler_fn(move |p| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    HandlerResult::Value(p)
                }
            }),
        )
        .await
        .unwrap();
    }

    let ack = bus.call("e", None).await;
    assert!(ack.ok);
    assert_eq!(ack.message, "scheduled");

    for _ in 0..3 {
        tokio::task::yield_now().await;
        clock.advance(Duration::from_millis(20));
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn scenario_7_debounce_trailing_fire_passes_required_validation() {
    let clock = Arc::new(MockClock::new());
    let bus = Cyre::with_clock(clock.clone());
    let last_seen = Arc::new(std::sync::Mutex::new(None));

    bus.action(
        ActionConfig::new("f")
            .with_debounce(50)
            .with_required(true),
    )
    .await
    .unwrap();
    {
        let last_seen = last_seen.clone();
        bus.on(
            "f",
            handler_fn(move |p| {
                let last_seen = last_seen.clone();
                async move {
                    *last_seen.lock().unwrap() = Some(p.clone());
                    HandlerResult::Value(p)
                }
            }),
        )
        .await
        .unwrap();
    }

    let response = bus.call("f", Some(Payload::from(json!({"v": 1})))).await;
    assert!(response.ok);
    assert_eq!(response.message, "debounced");

    clock.advance(Duration::from_millis(60));
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        *last_seen.lock().unwrap(),
        Some(Payload::from(json!({"v": 1}))),
        "a debounced call's own payload must satisfy required validation on the trailing fire"
    );
}

#[tokio::test]
async fn scenario_8_scheduled_call_carries_the_caller_payload() {
    let clock = Arc::new(MockClock::new());
    let bus = Cyre::with_clock(clock.clone());
    let last_seen = Arc::new(std::sync::Mutex::new(None));

    bus.action(ActionConfig::new("g").with_delay(20))
        .await
        .unwrap();
    {
        let last_seen = last_seen.clone();
        bus.on(
            "g",
            handler_fn(move |p| {
                let last_seen = last_seen.clone();
                async move {
                    *last_seen.lock().unwrap() = Some(p.clone());
                    HandlerResult::Value(p)
                }
            }),
        )
        .await
        .unwrap();
    }

    let ack = bus.call("g", Some(Payload::from(json!({"from": "caller"})))).await;
    assert!(ack.ok);
    assert_eq!(ack.message, "scheduled");

    clock.advance(Duration::from_millis(20));
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        *last_seen.lock().unwrap(),
        Some(Payload::from(json!({"from": "caller"}))),
        "a scheduled firing must dispatch with the payload the caller supplied"
    );
}

#[tokio::test]
async fn scenario_6_branches_isolate_same_local_id() {
    let bus = Cyre::new();
    let b1 = bus.create_branch("b1", None).unwrap();
    let b2 = bus.create_branch("b2", None).unwrap();

    b1.action(ActionConfig::new("k")).await.unwrap();
    b2.action(ActionConfig::new("k")).await.unwrap();

    b1.on(
        "k",
        handler_fn(|_| async move { HandlerResult::Value(Payload::from(json!({"from": "b1"}))) }),
    )
    .await
    .unwrap();
    b2.on(
        "k",
        handler_fn(|_| async move { HandlerResult::Value(Payload::from(json!({"from": "b2"}))) }),
    )
    .await
    .unwrap();

    let r1 = b1.call("k", None).await;
    let r2 = b2.call("k", None).await;
    assert_eq!(r1.payload, Payload::from(json!({"from": "b1"})));
    assert_eq!(r2.payload, Payload::from(json!({"from": "b2"})));
}
