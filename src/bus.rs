//! [`Cyre`]: the value a host instantiates to get a bus. Wraps a shared
//! [`BusInner`] that owns every subsystem (registries, pipeline cache,
//! scheduler, breathing controller, metrics log); `Cyre` itself is a
//! cheap `Arc` handle, cloneable for multiple owners of the same bus
//! (spec §9 "the core is a value the host instantiates").

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;

use crate::configuration::action::ActionConfig;
use crate::dispatcher::{dispatch, DispatchTrigger};
use crate::error::CyreError;
use crate::governance::breathing::{BreathingController, StressSample, SystemHealth};
use crate::kernel::payload::{Handler, Payload};
use crate::observability::metrics::{MetricCounters, MetricEvent, MetricQuery, MetricsLog};
use crate::pipeline::{Middleware, MiddlewareRegistry, PipelineCache};
use crate::registry::channel::ChannelRegistry;
use crate::registry::subscriber::{SubscriberRegistry, Subscription};
use crate::response::Response;
use crate::router::branch::Branch;
use crate::router::path::Path;
use crate::runtime::clock::{Clock, SystemClock};
use crate::runtime::scheduler::{ScheduledExecutor, TimeKeeper};

/// A registration acknowledgement (spec §6 `action(config) → {ok, message}`).
#[derive(Clone, Debug, PartialEq)]
pub struct ActionAck {
    pub id: String,
    pub ok: bool,
    pub message: String,
}

/// Samples metrics over a trailing window and feeds the breathing
/// controller (spec §4.9). Kept short relative to the default 2048-slot
/// metrics ring so the rate estimate tracks recent load.
const BREATHING_WINDOW_MS: u64 = 10_000;
/// Base period between breathing beats (spec §4.9 "≈200ms base").
const BREATHING_BEAT_MS: u64 = 200;

/// Everything a [`Cyre`] owns. Never constructed or held directly by a
/// host — always behind the `Arc` inside `Cyre`.
pub struct BusInner {
    self_ref: Weak<BusInner>,
    channels: ChannelRegistry,
    subscribers: Arc<SubscriberRegistry>,
    scheduler: Arc<TimeKeeper>,
    breathing: Arc<BreathingController>,
    metrics: MetricsLog,
    middleware: MiddlewareRegistry,
    pipeline_cache: PipelineCache,
    clock: Arc<dyn Clock>,
}

impl BusInner {
    pub(crate) fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }
    pub(crate) fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }
    pub(crate) fn scheduler(&self) -> &Arc<TimeKeeper> {
        &self.scheduler
    }
    pub(crate) fn breathing(&self) -> &BreathingController {
        &self.breathing
    }
    pub(crate) fn metrics(&self) -> &MetricsLog {
        &self.metrics
    }
    pub(crate) fn middleware(&self) -> &MiddlewareRegistry {
        &self.middleware
    }
    pub(crate) fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipeline_cache
    }
    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// Drives scheduled firings: the `TimeKeeper` only knows paths and
/// timing, never channels or handlers, so it calls back into the bus
/// through this trait (spec §4.7).
#[async_trait]
impl ScheduledExecutor for BusInner {
    async fn execute_scheduled(&self, path: Path) {
        if let Some(strong) = self.self_ref.upgrade() {
            dispatch(&strong, path, None, 0, DispatchTrigger::ScheduledRepeat).await;
        }
    }
}

/// The bus a host instantiates (spec §9 "eliminates hidden coupling in
/// tests" — a `Bus` is a value, a process-wide default is optional).
#[derive(Clone)]
pub struct Cyre(Arc<BusInner>);

impl Default for Cyre {
    fn default() -> Self {
        Self::new()
    }
}

impl Cyre {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Builds a bus on a caller-supplied [`Clock`] — the seam tests use
    /// to drive throttle/debounce/scheduler behavior deterministically
    /// with a [`crate::runtime::clock::MockClock`] instead of racing
    /// real time.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let breathing = Arc::new(BreathingController::new());
        let scheduler = TimeKeeper::new(clock.clone(), breathing.clone());

        let inner = Arc::new_cyclic(|weak: &Weak<BusInner>| {
            let executor: Weak<dyn ScheduledExecutor> = weak.clone();
            scheduler.attach(executor);
            BusInner {
                self_ref: weak.clone(),
                channels: ChannelRegistry::new(),
                subscribers: Arc::new(SubscriberRegistry::new()),
                scheduler: scheduler.clone(),
                breathing,
                metrics: MetricsLog::default(),
                middleware: MiddlewareRegistry::new(),
                pipeline_cache: PipelineCache::new(),
                clock,
            }
        });

        spawn_breathing_loop(&inner);
        Self(inner)
    }

    /// Registers or replaces a channel (spec §4.1 `action`).
    pub async fn action(&self, config: ActionConfig) -> Result<ActionAck, CyreError> {
        let now = self.0.clock.now_ms();
        let id = config.id.clone();
        let (path, replaced) = self.0.channels.action(config, now)?;
        self.0.pipeline_cache.invalidate(&path);
        if replaced {
            self.0.scheduler.cancel(&path);
        }
        Ok(ActionAck {
            id,
            ok: true,
            message: if replaced {
                "replaced".to_owned()
            } else {
                "registered".to_owned()
            },
        })
    }

    /// Binds a handler to an already-resolved path (spec §4.1 `on`).
    pub async fn on_path(
        &self,
        path: Path,
        handler: Arc<dyn Handler>,
    ) -> Result<Subscription, CyreError> {
        self.0.subscribers.on(path.clone(), handler);
        Ok(Subscription::new(&self.0.subscribers, path))
    }

    pub async fn on(&self, path: &str, handler: Arc<dyn Handler>) -> Result<Subscription, CyreError> {
        self.on_path(Path::parse(path)?, handler).await
    }

    /// Registers a named middleware instance so channels can reference
    /// it by id in their `middleware` list (spec §6 `middleware: array
    /// of ids`). External middleware has no access to internal bus
    /// state (spec §4.4 stage 10) — it only ever sees the payload it is
    /// handed.
    pub fn register_middleware(&self, id: impl Into<String>, middleware: Arc<dyn Middleware>) {
        self.0.middleware.register(id, middleware);
    }

    /// Calls an already-resolved path (spec §4.5). A channel whose
    /// config requires the scheduler is handed off immediately; it is
    /// never dispatched synchronously (spec §4.5 step 4).
    pub async fn call_path(&self, path: Path, payload: Option<Payload>) -> Response {
        let channel = match self.0.channels.get(&path) {
            Some(channel) => channel,
            None => return CyreError::NoChannel.into_response(),
        };

        // `block` short-circuits ahead of everything, including the
        // scheduler hand-off (spec §3 "compiles to a permanent-block
        // plan"/P8) — a blocked channel never schedules a timer at all.
        if channel.config.block {
            self.0.metrics.record(MetricEvent {
                path: path.clone(),
                kind: crate::observability::metrics::MetricKind::Blocked,
                timestamp_ms: self.0.clock.now_ms(),
                latency_ms: None,
            });
            return CyreError::Blocked.into_response();
        }

        if channel.config.requires_scheduler() {
            // Scheduled firings dispatch with no `payload_override` (they
            // read the channel's stored payload), so a payload the caller
            // passed here has to land in the channel first or it is lost.
            if let Some(payload) = payload {
                channel.accept(payload, self.0.clock.now_ms());
            }
            self.0.scheduler.schedule(
                path,
                channel.config.delay,
                channel.config.interval,
                channel.config.repeat,
            );
            return Response::scheduled();
        }

        dispatch(&self.0, path, payload, 0, DispatchTrigger::Call).await
    }

    pub async fn call(&self, path: &str, payload: Option<Payload>) -> Response {
        match Path::parse(path) {
            Ok(resolved) => self.call_path(resolved, payload).await,
            Err(err) => err.into_response(),
        }
    }

    /// Forgets a channel: cancels its scheduler entry, drops its
    /// subscriber, and purges its compiled plan (spec §4.1 `forget`).
    pub async fn forget_path(&self, path: &Path) -> Result<bool, CyreError> {
        self.0.scheduler.cancel(path);
        self.0.pipeline_cache.invalidate(path);
        let had_subscriber = self.0.subscribers.forget(path);
        let had_channel = self.0.channels.forget(path);
        Ok(had_channel || had_subscriber)
    }

    pub async fn forget(&self, path: &str) -> Result<bool, CyreError> {
        self.forget_path(&Path::parse(path)?).await
    }

    /// Forgets every channel under `prefix` (spec §3 "destroying a
    /// branch destroys all channels under that prefix"). `prefix` itself
    /// and anything nested one or more segments below it are both
    /// considered "under" it.
    pub async fn forget_prefix(&self, prefix: &str) -> usize {
        let owned_prefix = format!("{prefix}/");
        let matching: Vec<Path> = self
            .0
            .channels
            .get_all()
            .into_iter()
            .map(|channel| channel.path.clone())
            .filter(|path| path.as_str() == prefix || path.as_str().starts_with(&owned_prefix))
            .collect();

        let mut removed = 0;
        for path in matching {
            if self.forget_path(&path).await.unwrap_or(false) {
                removed += 1;
            }
        }
        removed
    }

    /// Creates the implicit root branch's first namespace (spec §4.2).
    pub fn create_branch(&self, id: &str, max_depth: Option<usize>) -> Result<Branch, CyreError> {
        Branch::root(self.clone()).create_branch(id, max_depth)
    }

    pub fn get(&self, path: &Path) -> Option<ActionConfig> {
        self.0.channels.get(path).map(|channel| channel.config.clone())
    }

    pub fn get_all(&self) -> Vec<ActionConfig> {
        self.0
            .channels
            .get_all()
            .into_iter()
            .map(|channel| channel.config.clone())
            .collect()
    }

    /// Drops every channel, subscriber, compiled plan and scheduler
    /// entry, but keeps metrics history (spec §6 `clear()`).
    pub fn clear(&self) {
        self.0.scheduler.clear();
        self.0.channels.clear();
        self.0.subscribers.clear();
        self.0.pipeline_cache.clear();
    }

    /// Like [`Self::clear`], but also wipes the metrics log (spec §6
    /// `reset()`).
    pub fn reset(&self) {
        self.clear();
        self.0.metrics.clear();
    }

    pub fn get_metrics(&self, query: &MetricQuery) -> Vec<MetricEvent> {
        self.0.metrics.query(query)
    }

    pub fn get_metric_counters(&self) -> MetricCounters {
        self.0.metrics.counters()
    }

    /// The breathing controller's current snapshot (spec §6
    /// `getSystemHealth()`).
    pub fn get_system_health(&self) -> SystemHealth {
        self.0.breathing.health()
    }
}

/// Periodically samples the metrics log and folds the result into the
/// breathing controller (spec §4.9). Holds only a weak reference to the
/// bus, so it stops on its own once every `Cyre` handle is dropped,
/// rather than keeping the bus alive forever.
fn spawn_breathing_loop(bus: &Arc<BusInner>) {
    let weak = Arc::downgrade(bus);
    tokio::spawn(async move {
        loop {
            let bus = match weak.upgrade() {
                Some(bus) => bus,
                None => return,
            };
            let sleep = bus.clock.sleep(Duration::from_millis(BREATHING_BEAT_MS));
            drop(bus);
            sleep.await;

            let bus = match weak.upgrade() {
                Some(bus) => bus,
                None => return,
            };
            let now = bus.clock.now_ms();
            let call_rate = bus.metrics.call_rate(now, BREATHING_WINDOW_MS);
            let error_rate = bus.metrics.error_rate(now, BREATHING_WINDOW_MS);
            bus.breathing.beat(StressSample {
                call_rate,
                error_rate,
            });
        }
    });
}

static DEFAULT_BUS: OnceLock<Cyre> = OnceLock::new();

/// The process-wide convenience instance (spec §9: optional, not a
/// requirement — most hosts should prefer `Cyre::new()`).
pub fn default_bus() -> &'static Cyre {
    DEFAULT_BUS.get_or_init(Cyre::new)
}
