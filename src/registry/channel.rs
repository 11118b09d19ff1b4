use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::configuration::action::ActionConfig;
use crate::error::CyreError;
use crate::kernel::payload::Payload;
use crate::router::path::Path;

/// Mutable per-channel state that must change together: `payload` and
/// `previous_payload` are only ever written in the same critical section
/// (spec §3 invariant I6 — `previousPayload` is updated only when a
/// payload is accepted for execution).
struct ChannelState {
    payload: Payload,
    previous_payload: Payload,
    timestamp_ms: u64,
    debounce_generation: u64,
    pending_debounce_payload: Option<Payload>,
    debounce_window_start_ms: Option<u64>,
}

/// A registered channel (spec §3 "Channel record"). Owned exclusively by
/// the [`ChannelRegistry`]; the scheduler and dispatcher only ever hold a
/// `Path` plus a clone of this `Arc`, never a second writer.
pub struct ChannelRecord {
    pub path: Path,
    pub config: ActionConfig,
    state: Mutex<ChannelState>,
    last_execution_time_ms: AtomicU64,
    execution_count: AtomicU64,
    error_count: AtomicU64,
}

impl ChannelRecord {
    fn new(path: Path, config: ActionConfig, now_ms: u64) -> Self {
        let initial_payload = config.payload.clone().unwrap_or_else(Payload::null);
        Self {
            path,
            config,
            state: Mutex::new(ChannelState {
                payload: initial_payload,
                previous_payload: Payload::null(),
                timestamp_ms: now_ms,
                debounce_generation: 0,
                pending_debounce_payload: None,
                debounce_window_start_ms: None,
            }),
            last_execution_time_ms: AtomicU64::new(0),
            execution_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    pub fn current_payload(&self) -> Payload {
        self.state.lock().payload.clone()
    }

    pub fn previous_payload(&self) -> Payload {
        self.state.lock().previous_payload.clone()
    }

    /// Deep-equality comparison against `previousPayload` (spec §4.1
    /// `hasChanged`, §4.4 stage 8).
    pub fn has_changed(&self, payload: &Payload) -> bool {
        self.state.lock().previous_payload != *payload
    }

    /// Accepts `payload` for execution: updates `previousPayload` and the
    /// last-set timestamp atomically (I6). Called only by the change
    /// detection stage (or unconditionally when `detectChanges` is unset).
    pub fn accept(&self, payload: Payload, now_ms: u64) {
        let mut state = self.state.lock();
        state.previous_payload = payload.clone();
        state.payload = payload;
        state.timestamp_ms = now_ms;
    }

    pub fn debounce_generation(&self) -> u64 {
        self.state.lock().debounce_generation
    }

    /// Starts (or extends) a debounce window: bumps the generation,
    /// stashes the payload to fire with once the window elapses, and
    /// records when the *first* call in this window arrived (needed to
    /// enforce `maxWait`). Returns `(generation, window_start_ms)` for
    /// the caller to size the deferred wait against.
    pub fn start_debounce(&self, payload: Payload, now_ms: u64) -> (u64, u64) {
        let mut state = self.state.lock();
        state.debounce_generation += 1;
        state.pending_debounce_payload = Some(payload);
        let window_start = *state.debounce_window_start_ms.get_or_insert(now_ms);
        (state.debounce_generation, window_start)
    }

    /// Takes the payload stashed by [`Self::start_debounce`] and closes
    /// the window, if the caller's generation is still the most recent
    /// one (otherwise a newer call has superseded this firing).
    pub fn take_debounce_payload(&self, generation: u64) -> Option<Payload> {
        let mut state = self.state.lock();
        if state.debounce_generation == generation {
            state.debounce_window_start_ms = None;
            state.pending_debounce_payload.take()
        } else {
            None
        }
    }

    /// `dt = now - lastExecutionTime`; `0` means "never executed" (spec
    /// §4.4 stage 6 — "first call always passes").
    pub fn last_execution_time_ms(&self) -> u64 {
        self.last_execution_time_ms.load(Ordering::Acquire)
    }

    /// Monotonic write (spec §3 invariant I8): only ever called with a
    /// strictly increasing `now_ms` by the throttle stage after a
    /// successful dispatch.
    pub fn record_execution(&self, now_ms: u64) {
        self.last_execution_time_ms
            .fetch_max(now_ms, Ordering::AcqRel);
        self.execution_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

/// The channel registry (C4): one record per full path (spec §3
/// invariant I1), backed by a concurrent map for per-key parallelism.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<Path, Arc<ChannelRecord>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Registers or replaces a channel (spec §4.1 `action`). Replacing an
    /// existing channel resets its runtime counters and payload history —
    /// it is a new configuration taking over the path, not a patch; see
    /// `DESIGN.md` for this Open Question decision.
    pub fn action(&self, config: ActionConfig, now_ms: u64) -> Result<(Path, bool), CyreError> {
        let path = Path::parse(&config.id)?;
        let replaced = self.channels.contains_key(&path);
        let record = Arc::new(ChannelRecord::new(path.clone(), config, now_ms));
        self.channels.insert(path.clone(), record);
        Ok((path, replaced))
    }

    pub fn get(&self, path: &Path) -> Option<Arc<ChannelRecord>> {
        self.channels.get(path).map(|entry| entry.value().clone())
    }

    pub fn forget(&self, path: &Path) -> bool {
        self.channels.remove(path).is_some()
    }

    pub fn get_all(&self) -> Vec<Arc<ChannelRecord>> {
        self.channels.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn clear(&self) {
        self.channels.clear();
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
