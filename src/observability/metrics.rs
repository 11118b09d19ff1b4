use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::router::path::Path;

/// The kind of thing a [`MetricEvent`] records (spec §4.8 `kind ∈
/// {call, dispatch, execution, error, throttle, debounce, skip,
/// middleware, timeout, system, info, debug, delayed, blocked}`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Call,
    Dispatch,
    Execution,
    Throttled,
    Debounced,
    Skipped,
    Blocked,
    Error,
    ChainReaction,
    MiddlewareRejected,
    SystemGate,
    SchedulerError,
    Delayed,
}

/// A single recorded occurrence against a channel.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricEvent {
    pub path: Path,
    pub kind: MetricKind,
    pub timestamp_ms: u64,
    pub latency_ms: Option<u64>,
}

/// A filter over the metrics log's history.
#[derive(Clone, Debug, Default)]
pub struct MetricQuery {
    pub path_prefix: Option<String>,
    pub kind: Option<MetricKind>,
    pub since_ms: Option<u64>,
}

impl MetricQuery {
    fn matches(&self, event: &MetricEvent) -> bool {
        if let Some(prefix) = &self.path_prefix {
            if !event.path.as_str().starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if event.kind != kind {
                return false;
            }
        }
        if let Some(since) = self.since_ms {
            if event.timestamp_ms < since {
                return false;
            }
        }
        true
    }
}

/// Aggregate counters, one atomic per [`MetricKind`], cheap to read
/// without draining the bounded event ring.
#[derive(Default)]
pub struct MetricCounters {
    pub calls: u64,
    pub dispatches: u64,
    pub executions: u64,
    pub throttled: u64,
    pub debounced: u64,
    pub skipped: u64,
    pub blocked: u64,
    pub errors: u64,
    pub chain_reactions: u64,
    pub middleware_rejected: u64,
    pub system_gated: u64,
    pub scheduler_errors: u64,
    pub delayed: u64,
}

struct Counters {
    calls: AtomicU64,
    dispatches: AtomicU64,
    executions: AtomicU64,
    throttled: AtomicU64,
    debounced: AtomicU64,
    skipped: AtomicU64,
    blocked: AtomicU64,
    errors: AtomicU64,
    chain_reactions: AtomicU64,
    middleware_rejected: AtomicU64,
    system_gated: AtomicU64,
    scheduler_errors: AtomicU64,
    delayed: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            executions: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            debounced: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            chain_reactions: AtomicU64::new(0),
            middleware_rejected: AtomicU64::new(0),
            system_gated: AtomicU64::new(0),
            scheduler_errors: AtomicU64::new(0),
            delayed: AtomicU64::new(0),
        }
    }

    fn bump(&self, kind: MetricKind) {
        let counter = match kind {
            MetricKind::Call => &self.calls,
            MetricKind::Dispatch => &self.dispatches,
            MetricKind::Execution => &self.executions,
            MetricKind::Throttled => &self.throttled,
            MetricKind::Debounced => &self.debounced,
            MetricKind::Skipped => &self.skipped,
            MetricKind::Blocked => &self.blocked,
            MetricKind::Error => &self.errors,
            MetricKind::ChainReaction => &self.chain_reactions,
            MetricKind::MiddlewareRejected => &self.middleware_rejected,
            MetricKind::SystemGate => &self.system_gated,
            MetricKind::SchedulerError => &self.scheduler_errors,
            MetricKind::Delayed => &self.delayed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricCounters {
        MetricCounters {
            calls: self.calls.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            debounced: self.debounced.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            chain_reactions: self.chain_reactions.load(Ordering::Relaxed),
            middleware_rejected: self.middleware_rejected.load(Ordering::Relaxed),
            system_gated: self.system_gated.load(Ordering::Relaxed),
            scheduler_errors: self.scheduler_errors.load(Ordering::Relaxed),
            delayed: self.delayed.load(Ordering::Relaxed),
        }
    }
}

/// The metrics log (C2): a bounded ring of recent events plus
/// always-on counters. Bounded so long-running processes don't grow
/// this log without limit; counters never roll over since they track
/// lifetime totals independent of the ring's retention window.
pub struct MetricsLog {
    events: Mutex<VecDeque<MetricEvent>>,
    capacity: usize,
    counters: Counters,
}

const DEFAULT_CAPACITY: usize = 2_048;

impl Default for MetricsLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MetricsLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(256))),
            capacity,
            counters: Counters::new(),
        }
    }

    pub fn record(&self, event: MetricEvent) {
        self.counters.bump(event.kind);
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn query(&self, query: &MetricQuery) -> Vec<MetricEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| query.matches(event))
            .cloned()
            .collect()
    }

    pub fn counters(&self) -> MetricCounters {
        self.counters.snapshot()
    }

    /// Calls observed in the trailing `window_ms`, expressed as calls
    /// per second — fed into the breathing controller's stress sample.
    pub fn call_rate(&self, now_ms: u64, window_ms: u64) -> f64 {
        let since = now_ms.saturating_sub(window_ms);
        let count = self
            .events
            .lock()
            .iter()
            .rev()
            .take_while(|event| event.timestamp_ms >= since)
            .filter(|event| event.kind == MetricKind::Call)
            .count();
        if window_ms == 0 {
            0.0
        } else {
            count as f64 / (window_ms as f64 / 1000.0)
        }
    }

    /// Error rate in `[0, 1]` over the trailing `window_ms`, fed into
    /// the breathing controller's stress sample alongside call rate.
    pub fn error_rate(&self, now_ms: u64, window_ms: u64) -> f64 {
        let since = now_ms.saturating_sub(window_ms);
        let events = self.events.lock();
        let mut total = 0usize;
        let mut errors = 0usize;
        for event in events.iter().rev().take_while(|event| event.timestamp_ms >= since) {
            if matches!(event.kind, MetricKind::Call | MetricKind::Execution) {
                total += 1;
            }
            if event.kind == MetricKind::Error {
                errors += 1;
                total += 1;
            }
        }
        if total == 0 {
            0.0
        } else {
            errors as f64 / total as f64
        }
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(path: &str, kind: MetricKind, timestamp_ms: u64) -> MetricEvent {
        MetricEvent {
            path: Path::parse(path).unwrap(),
            kind,
            timestamp_ms,
            latency_ms: None,
        }
    }

    #[test]
    fn bounded_ring_drops_oldest() {
        let log = MetricsLog::new(2);
        log.record(sample("a", MetricKind::Call, 1));
        log.record(sample("a", MetricKind::Call, 2));
        log.record(sample("a", MetricKind::Call, 3));
        let all = log.query(&MetricQuery::default());
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].timestamp_ms, 2);
    }

    #[test]
    fn counters_persist_past_ring_eviction() {
        let log = MetricsLog::new(1);
        for i in 0..5 {
            log.record(sample("a", MetricKind::Call, i));
        }
        assert_eq!(log.counters().calls, 5);
        assert_eq!(log.query(&MetricQuery::default()).len(), 1);
    }

    #[test]
    fn query_filters_by_prefix_and_kind() {
        let log = MetricsLog::new(16);
        log.record(sample("a/1", MetricKind::Call, 10));
        log.record(sample("b/1", MetricKind::Throttled, 10));
        let results = log.query(&MetricQuery {
            path_prefix: Some("a".into()),
            ..Default::default()
        });
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path.as_str(), "a/1");
    }
}
