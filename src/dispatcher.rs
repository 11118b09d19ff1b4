//! The dispatcher (C9): routes one `call` through a channel's compiled
//! pipeline to its subscriber and folds the outcome into a [`Response`]
//! (spec §4.5). Scheduled firings and debounce trailing-edge firings
//! re-enter this same function with a different [`DispatchTrigger`]
//! rather than duplicating the stage walk.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::BusInner;
use crate::configuration::action::Priority;
use crate::error::CyreError;
use crate::kernel::payload::{HandlerResult, Payload};
use crate::observability::metrics::{MetricEvent, MetricKind};
use crate::pipeline::{MiddlewareOutcome, StageKind};
use crate::response::Response;
use crate::router::path::Path;

/// Caps recursive chain reactions (spec §4.6, §9 "cyclic chain
/// reactions"). A handler that keeps returning `Chain` requests to a
/// cycle of channels would otherwise recurse forever.
pub(crate) const MAX_CHAIN_DEPTH: usize = 16;

/// Why this particular re-entry into the pipeline is happening. Only
/// the protection stages that care about timing (throttle, debounce)
/// branch on this; every other stage treats all three the same.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DispatchTrigger {
    /// A direct `call` from a host or from a chain reaction.
    Call,
    /// The deferred firing of a debounce window, carrying the
    /// generation it must still match to avoid firing stale (spec §3
    /// invariant I7).
    DebounceTrailing(u64),
    /// A scheduler-driven repeat/delay firing (spec §4.7): throttle and
    /// debounce are bypassed since the schedule itself is the timing
    /// policy, but every other stage still runs.
    ScheduledRepeat,
}

fn record_metric(bus: &BusInner, path: &Path, kind: MetricKind) {
    bus.metrics().record(MetricEvent {
        path: path.clone(),
        kind,
        timestamp_ms: bus.clock().now_ms(),
        latency_ms: None,
    });
}

/// Runs `path`'s compiled pipeline against `payload_override` (or the
/// channel's last-known payload, if absent). Written as a plain
/// function returning a boxed future, rather than `async fn`, because
/// chain reactions recurse into this same function — an `async fn`
/// calling itself directly produces an infinitely-sized future type.
pub(crate) fn dispatch<'a>(
    bus: &'a Arc<BusInner>,
    path: Path,
    payload_override: Option<Payload>,
    depth: usize,
    trigger: DispatchTrigger,
) -> Pin<Box<dyn Future<Output = Response> + Send + 'a>> {
    Box::pin(async move {
        if trigger == DispatchTrigger::Call {
            record_metric(bus, &path, MetricKind::Call);
        }
        record_metric(bus, &path, MetricKind::Dispatch);

        let channel = match bus.channels().get(&path) {
            Some(channel) => channel,
            None => return CyreError::NoChannel.into_response(),
        };

        // Block compiles to a standing rejection, ahead of every other
        // stage including the system gate (spec §4.3).
        if channel.config.block {
            record_metric(bus, &path, MetricKind::Blocked);
            return CyreError::Blocked.into_response();
        }

        let plan = bus
            .pipeline_cache()
            .get_or_compile(&path, &channel.config);

        let mut payload = payload_override.unwrap_or_else(|| channel.current_payload());

        // A debounce trailing firing must run the whole pipeline against
        // the payload that was actually debounced, not the channel's last
        // stored payload — taken here, before any stage sees `payload`,
        // since Validation/Selector/Condition all run ahead of the
        // Debounce stage itself (spec order, not firing order).
        if let DispatchTrigger::DebounceTrailing(generation) = trigger {
            match channel.take_debounce_payload(generation) {
                Some(fired) => payload = fired,
                None => {
                    return Response::ok_with_message(
                        Payload::null(),
                        "debounce window superseded",
                    );
                }
            }
        }

        for stage in &plan.active_stages {
            match stage {
                StageKind::SystemGate => {
                    if bus.breathing().is_recuperating() && channel.config.priority != Priority::Critical {
                        record_metric(bus, &path, MetricKind::SystemGate);
                        tracing::debug!(path = %path, "system gate rejected call while recuperating");
                        return CyreError::SystemRecuperating.into_response();
                    }
                }
                StageKind::RepeatZero => {
                    return Response::ok_with_message(Payload::null(), "registered but not executed");
                }
                StageKind::Validation => {
                    if channel.config.required && payload.is_null() {
                        return CyreError::ValidationFailed("required payload is missing".into())
                            .into_response();
                    }
                    if let Some(schema) = &channel.config.schema {
                        if let Err(reason) = schema(&payload) {
                            return CyreError::ValidationFailed(reason).into_response();
                        }
                    }
                }
                StageKind::Selector => {
                    if let Some(selector) = &channel.config.selector {
                        payload = selector(&payload);
                    }
                }
                StageKind::Condition => {
                    if let Some(condition) = &channel.config.condition {
                        if !condition(&payload) {
                            return Response::ok_with_message(Payload::null(), "condition not met");
                        }
                    }
                }
                StageKind::Throttle => {
                    if trigger == DispatchTrigger::ScheduledRepeat {
                        continue;
                    }
                    if let Some(throttle_ms) = channel.config.throttle {
                        let last = channel.last_execution_time_ms();
                        if last != 0 {
                            let now = bus.clock().now_ms();
                            let dt = now.saturating_sub(last);
                            if dt < throttle_ms {
                                record_metric(bus, &path, MetricKind::Throttled);
                                tracing::debug!(path = %path, remaining_ms = throttle_ms - dt, "throttled");
                                return CyreError::Throttled {
                                    remaining_ms: throttle_ms - dt,
                                }
                                .into_response();
                            }
                        }
                    }
                }
                StageKind::Debounce => {
                    if trigger == DispatchTrigger::ScheduledRepeat {
                        continue;
                    }
                    if let DispatchTrigger::DebounceTrailing(_) = trigger {
                        // Payload already taken above, ahead of the stage
                        // loop; nothing left to do for this firing.
                    } else {
                        let debounce_ms = channel.config.debounce.unwrap_or(0);
                        let now = bus.clock().now_ms();
                        let (generation, window_start) = channel.start_debounce(payload.clone(), now);
                        let mut wait_ms = debounce_ms;
                        if let Some(max_wait) = channel.config.max_wait {
                            let elapsed = now.saturating_sub(window_start);
                            wait_ms = wait_ms.min(max_wait.saturating_sub(elapsed));
                        }

                        record_metric(bus, &path, MetricKind::Debounced);

                        let deferred_bus = Arc::clone(bus);
                        let deferred_path = path.clone();
                        let sleep = bus.clock().sleep(Duration::from_millis(wait_ms));
                        tokio::spawn(async move {
                            sleep.await;
                            dispatch(
                                &deferred_bus,
                                deferred_path,
                                None,
                                depth,
                                DispatchTrigger::DebounceTrailing(generation),
                            )
                            .await;
                        });

                        return Response::ok_with_message(Payload::null(), "debounced");
                    }
                }
                StageKind::ChangeDetection => {
                    if !channel.has_changed(&payload) {
                        record_metric(bus, &path, MetricKind::Skipped);
                        return Response::ok_with_message(payload.clone(), "skipped: no changes");
                    }
                    channel.accept(payload.clone(), bus.clock().now_ms());
                }
                StageKind::Transform => {
                    if let Some(transform) = &channel.config.transform {
                        payload = transform(&payload);
                    }
                }
                StageKind::Middleware => {
                    for id in &channel.config.middleware {
                        let middleware = match bus.middleware().get(id) {
                            Some(middleware) => middleware,
                            None => {
                                return CyreError::MiddlewareError(format!(
                                    "no middleware registered for id {id:?}"
                                ))
                                .into_response()
                            }
                        };
                        match middleware.apply(payload.clone()).await {
                            MiddlewareOutcome::Continue(next) => payload = next,
                            MiddlewareOutcome::Reject(reason) => {
                                record_metric(bus, &path, MetricKind::MiddlewareRejected);
                                return CyreError::MiddlewareRejected(reason).into_response()
                            }
                        }
                    }
                }
                StageKind::Handler => {
                    if !plan.has_stage(StageKind::ChangeDetection) {
                        channel.accept(payload.clone(), bus.clock().now_ms());
                    }

                    let handler = match bus.subscribers().get(&path) {
                        Some(handler) => handler,
                        None => return CyreError::NoSubscriber.into_response(),
                    };

                    // `lastExecutionTime` is the dispatch time, not the
                    // completion time — captured here so a slow handler
                    // doesn't push the throttle window out past its await.
                    let dispatch_ms = bus.clock().now_ms();

                    let outcome = tokio::spawn({
                        let payload = payload.clone();
                        async move { handler.call(payload).await }
                    })
                    .await;

                    return match outcome {
                        Ok(HandlerResult::Value(value)) => {
                            channel.record_execution(dispatch_ms);
                            record_metric(bus, &path, MetricKind::Execution);
                            let execution_path = if plan.fast_path {
                                crate::response::ExecutionPath::FastPath
                            } else {
                                crate::response::ExecutionPath::Pipeline
                            };
                            Response::ok(value).with_execution_path(execution_path)
                        }
                        Ok(HandlerResult::Chain {
                            id: chain_id,
                            payload: chain_payload,
                        }) => {
                            channel.record_execution(dispatch_ms);
                            record_metric(bus, &path, MetricKind::Execution);
                            record_metric(bus, &path, MetricKind::ChainReaction);

                            if depth >= MAX_CHAIN_DEPTH {
                                tracing::warn!(path = %path, chain_id = %chain_id, "chain depth limit reached");
                                return CyreError::ChainCycle(chain_id).into_response();
                            }
                            let chain_path = match Path::parse(&chain_id) {
                                Ok(parsed) => parsed,
                                Err(err) => return err.into_response(),
                            };
                            let chain_response = dispatch(
                                bus,
                                chain_path,
                                chain_payload.clone(),
                                depth + 1,
                                DispatchTrigger::Call,
                            )
                            .await;
                            Response::ok(chain_payload.clone().unwrap_or_else(Payload::null))
                                .with_chain_link(chain_id, chain_payload, chain_response)
                        }
                        Err(join_error) => {
                            channel.record_execution(dispatch_ms);
                            channel.record_error();
                            record_metric(bus, &path, MetricKind::Error);
                            tracing::warn!(path = %path, error = %join_error, "handler panicked");
                            CyreError::HandlerError(format!("handler panicked: {join_error}"))
                                .into_response()
                        }
                    };
                }
            }
        }

        // `Handler` is always present in a compiled plan (spec §4.4), so
        // the loop above always returns from that arm; this is an
        // unreachable fallback kept only so the function is total.
        Response::ok(payload)
    })
}
