//! The metrics log (C2): a bounded record of what the bus has done,
//! queryable for dashboards and used by the breathing controller (C3)
//! to sample call/error rate (spec §5 "Metrics Log").

pub mod metrics;

pub use metrics::{MetricCounters, MetricEvent, MetricKind, MetricQuery, MetricsLog};
