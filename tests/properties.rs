//! Property-based checks for quantified invariants (SPEC_FULL.md §8):
//! P1 path uniqueness, P3 throttle bound, P5 change-detection idempotence.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cyre::{handler_fn, ActionConfig, Cyre, HandlerResult, MockClock, Payload};
use proptest::prelude::*;
use serde_json::json;

fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,8}"
}

proptest! {
    /// P1: a channel path uniquely identifies at most one registered
    /// channel; re-registering the same id replaces, it never duplicates.
    #[test]
    fn p1_same_id_never_registers_twice(id in segment()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let bus = Cyre::new();
            bus.action(ActionConfig::new(id.clone())).await.unwrap();
            bus.action(ActionConfig::new(id.clone()).with_throttle(5)).await.unwrap();

            let count = bus
                .get_all()
                .into_iter()
                .filter(|config| config.id == id)
                .count();
            prop_assert_eq!(count, 1);
        });
    }

    /// P3: within any throttle window, at most one call reaches the
    /// handler; arbitrary arrival deltas under the window are all
    /// rejected, and the first arrival past the window always admits.
    #[test]
    fn p3_throttle_admits_at_most_one_per_window(
        deltas in prop::collection::vec(0u64..=30, 1..6),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            const WINDOW_MS: u64 = 50;
            let clock = Arc::new(MockClock::new());
            let bus = Cyre::with_clock(clock.clone());
            let count = Arc::new(AtomicU32::new(0));

            bus.action(ActionConfig::new("throttled").with_throttle(WINDOW_MS))
                .await
                .unwrap();
            {
                let count = count.clone();
                bus.on(
                    "throttled",
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

            let mut elapsed_since_admit = u64::MAX;
            let mut admitted = 0u32;
            for delta in &deltas {
                clock.advance(Duration::from_millis(*delta));
                elapsed_since_admit = elapsed_since_admit.saturating_add(*delta);
                let response = bus.call("throttled", Some(Payload::from(json!(1)))).await;
                if elapsed_since_admit >= WINDOW_MS {
                    prop_assert!(response.ok);
                    admitted += 1;
                    elapsed_since_admit = 0;
                } else {
                    prop_assert!(!response.ok);
                }
            }

            prop_assert_eq!(count.load(Ordering::SeqCst), admitted);
        });
    }

    /// P5: change detection is idempotent — calling with the same
    /// payload any number of times in a row only ever executes once.
    #[test]
    fn p5_change_detection_is_idempotent_under_repetition(
        repeats in 1usize..6,
        value in 0i64..1000,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let bus = Cyre::new();
            bus.action(ActionConfig::new("stable").with_detect_changes(true))
                .await
                .unwrap();
            bus.on("stable", handler_fn(|p| async move { HandlerResult::Value(p) }))
                .await
                .unwrap();

            for i in 0..repeats {
                let response = bus
                    .call("stable", Some(Payload::from(json!(value))))
                    .await;
                prop_assert!(response.ok);
                if i > 0 {
                    prop_assert_eq!(response.message.as_str(), "skipped: no changes");
                }
            }

            prop_assert_eq!(bus.get_metric_counters().executions, 1);
        });
    }
}
