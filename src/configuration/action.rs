use std::fmt;
use std::sync::Arc;

use crate::kernel::payload::Payload;

/// Execution priority (spec §3/§6). Only `Critical` channels bypass the
/// breathing controller's system gate while the bus is recuperating
/// (spec §4.4 stage 1, P9).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
    Background,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Background => "background",
        }
    }
}

/// Scheduling repeat count (spec §3/§4.7). `0` registers the channel
/// without ever executing it; `Infinite` corresponds to the source's
/// `true`/`"infinite"`; `Times(1)` is the default when no scheduling
/// field is set at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Repeat {
    Never,
    Times(u32),
    Infinite,
}

impl Default for Repeat {
    fn default() -> Self {
        Repeat::Times(1)
    }
}

impl From<u32> for Repeat {
    fn from(value: u32) -> Self {
        if value == 0 {
            Repeat::Never
        } else {
            Repeat::Times(value)
        }
    }
}

impl From<bool> for Repeat {
    fn from(value: bool) -> Self {
        if value {
            Repeat::Infinite
        } else {
            Repeat::Times(1)
        }
    }
}

type Predicate = Arc<dyn Fn(&Payload) -> bool + Send + Sync>;
type Projection = Arc<dyn Fn(&Payload) -> Payload + Send + Sync>;
type Validator = Arc<dyn Fn(&Payload) -> Result<(), String> + Send + Sync>;

/// The per-channel configuration vocabulary (spec §6).
///
/// # Contract (What)
/// `id` is a raw, caller-supplied local or absolute id — it is resolved
/// against a branch prefix and grammar-validated at registration time
/// (spec §3), not here; `ActionConfig` itself carries no [`crate::Path`]
/// so it stays constructible before a bus or branch exists.
#[derive(Clone, Default)]
pub struct ActionConfig {
    pub id: String,
    pub kind: Option<String>,
    pub payload: Option<Payload>,

    pub throttle: Option<u64>,
    pub debounce: Option<u64>,
    pub max_wait: Option<u64>,
    pub detect_changes: bool,
    pub required: bool,
    pub block: bool,
    pub schema: Option<Validator>,
    pub condition: Option<Predicate>,
    pub selector: Option<Projection>,
    pub transform: Option<Projection>,

    pub interval: Option<u64>,
    pub delay: Option<u64>,
    pub repeat: Repeat,

    pub priority: Priority,
    pub middleware: Vec<String>,
}

impl ActionConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            repeat: Repeat::default(),
            priority: Priority::default(),
            ..Default::default()
        }
    }

    pub fn with_throttle(mut self, ms: u64) -> Self {
        self.throttle = Some(ms);
        self
    }

    pub fn with_debounce(mut self, ms: u64) -> Self {
        self.debounce = Some(ms);
        self
    }

    pub fn with_max_wait(mut self, ms: u64) -> Self {
        self.max_wait = Some(ms);
        self
    }

    pub fn with_detect_changes(mut self, detect: bool) -> Self {
        self.detect_changes = detect;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_block(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    pub fn with_schema(mut self, schema: Validator) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_condition(mut self, condition: Predicate) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_selector(mut self, selector: Projection) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_transform(mut self, transform: Projection) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_interval(mut self, ms: u64) -> Self {
        self.interval = Some(ms);
        self
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay = Some(ms);
        self
    }

    pub fn with_repeat(mut self, repeat: impl Into<Repeat>) -> Self {
        self.repeat = repeat.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_middleware(mut self, ids: Vec<String>) -> Self {
        self.middleware = ids;
        self
    }

    /// Whether this config requires the scheduler (spec §3 invariant I4).
    pub fn requires_scheduler(&self) -> bool {
        self.delay.is_some()
            || self.interval.is_some()
            || !matches!(self.repeat, Repeat::Times(1) | Repeat::Never)
    }

    /// `type` defaults to `id` when not set explicitly (spec §6).
    pub fn kind_or_id(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.id)
    }

    /// Projects the serializable scalar subset for logging/observability.
    pub fn describe(&self) -> ActionSnapshot {
        ActionSnapshot {
            id: self.id.clone(),
            kind: self.kind_or_id().to_owned(),
            throttle: self.throttle,
            debounce: self.debounce,
            max_wait: self.max_wait,
            detect_changes: self.detect_changes,
            required: self.required,
            block: self.block,
            interval: self.interval,
            delay: self.delay,
            repeat: format!("{:?}", self.repeat),
            priority: self.priority.as_str().to_owned(),
            middleware: self.middleware.clone(),
        }
    }
}

impl fmt::Debug for ActionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("throttle", &self.throttle)
            .field("debounce", &self.debounce)
            .field("max_wait", &self.max_wait)
            .field("detect_changes", &self.detect_changes)
            .field("required", &self.required)
            .field("block", &self.block)
            .field("has_schema", &self.schema.is_some())
            .field("has_condition", &self.condition.is_some())
            .field("has_selector", &self.selector.is_some())
            .field("has_transform", &self.transform.is_some())
            .field("interval", &self.interval)
            .field("delay", &self.delay)
            .field("repeat", &self.repeat)
            .field("priority", &self.priority)
            .field("middleware", &self.middleware)
            .finish()
    }
}

/// The serializable scalar projection of an [`ActionConfig`], used for
/// logging and metrics — see `DESIGN.md` for why the full config (which
/// carries host closures) cannot derive `Serialize` itself.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ActionSnapshot {
    pub id: String,
    pub kind: String,
    pub throttle: Option<u64>,
    pub debounce: Option<u64>,
    pub max_wait: Option<u64>,
    pub detect_changes: bool,
    pub required: bool,
    pub block: bool,
    pub interval: Option<u64>,
    pub delay: Option<u64>,
    pub repeat: String,
    pub priority: String,
    pub middleware: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_scheduler_matches_invariant_i4() {
        assert!(!ActionConfig::new("a").requires_scheduler());
        assert!(ActionConfig::new("a").with_interval(10).requires_scheduler());
        assert!(ActionConfig::new("a").with_delay(10).requires_scheduler());
        assert!(ActionConfig::new("a")
            .with_repeat(3u32)
            .requires_scheduler());
        assert!(!ActionConfig::new("a").with_repeat(1u32).requires_scheduler());
        assert!(!ActionConfig::new("a")
            .with_repeat(0u32)
            .requires_scheduler());
    }
}
