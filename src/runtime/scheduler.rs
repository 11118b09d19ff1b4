use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::configuration::action::Repeat;
use crate::governance::breathing::BreathingController;
use crate::router::path::Path;
use crate::runtime::clock::Clock;

/// Callback the scheduler invokes when a scheduled firing is due. The
/// bus implements this so the scheduler never needs to know about
/// channels, pipelines or handlers — only paths and timing.
#[async_trait]
pub trait ScheduledExecutor: Send + Sync + 'static {
    async fn execute_scheduled(&self, path: Path);
}

struct TimerHandle {
    generation: u64,
    join: tokio::task::JoinHandle<()>,
}

/// The scheduler (C8). One timer per channel path (spec §3 invariant
/// I5): scheduling a channel that already has a pending timer cancels
/// the old one first. Intervals are completion-relative — the wait
/// before the next firing starts only after the previous execution
/// finishes, so a slow handler stretches its own period rather than
/// queuing up firings (spec §4.7).
pub struct TimeKeeper {
    clock: Arc<dyn Clock>,
    breathing: Arc<BreathingController>,
    executor: parking_lot::RwLock<Option<Weak<dyn ScheduledExecutor>>>,
    timers: DashMap<Path, TimerHandle>,
    generation: AtomicU64,
}

impl TimeKeeper {
    pub fn new(clock: Arc<dyn Clock>, breathing: Arc<BreathingController>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            breathing,
            executor: parking_lot::RwLock::new(None),
            timers: DashMap::new(),
            generation: AtomicU64::new(0),
        })
    }

    /// Binds the executor the scheduler calls back into once the owning
    /// bus exists — see `Cyre::new`, which constructs the bus with
    /// `Arc::new_cyclic` and attaches its own weak handle here, the same
    /// self-registration shape used for controllers that must call back
    /// into the object that owns them.
    pub fn attach(&self, executor: Weak<dyn ScheduledExecutor>) {
        *self.executor.write() = Some(executor);
    }

    /// Schedules (or re-schedules) firings for `path`. `delay` is an
    /// initial one-shot wait before the first firing; `interval` is the
    /// completion-relative wait between subsequent firings; `repeat`
    /// bounds how many times the channel fires (spec §4.7).
    pub fn schedule(
        self: &Arc<Self>,
        path: Path,
        delay: Option<u64>,
        interval: Option<u64>,
        repeat: Repeat,
    ) {
        self.cancel(&path);

        if matches!(repeat, Repeat::Never) {
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let this = Arc::clone(self);
        let task_path = path.clone();

        let join = tokio::spawn(async move {
            // First fire waits `delay` if set; otherwise, if `interval`
            // is set, the first fire is `interval` ms out too (spec
            // §4.7: "interval set, delay absent: first fire at interval
            // ms, subsequent at interval apart" — it is never
            // immediate).
            if let Some(first_wait_ms) = delay.or(interval) {
                this.clock.sleep(Duration::from_millis(first_wait_ms)).await;
            }

            let mut remaining = match repeat {
                Repeat::Times(n) => Some(n),
                Repeat::Infinite => None,
                Repeat::Never => Some(0),
            };

            loop {
                if remaining == Some(0) {
                    break;
                }
                if !this.is_current(&task_path, generation) {
                    return;
                }

                let executor = match this.executor.read().as_ref().and_then(Weak::upgrade) {
                    Some(executor) => executor,
                    None => return,
                };
                executor.execute_scheduled(task_path.clone()).await;
                drop(executor);

                if let Some(count) = remaining.as_mut() {
                    *count -= 1;
                    if *count == 0 {
                        break;
                    }
                }

                match interval {
                    Some(base_ms) => {
                        let stretched = this.breathing.stretch_interval_ms(base_ms);
                        this.clock.sleep(Duration::from_millis(stretched)).await;
                    }
                    None => break,
                }
            }

            this.finish_if_current(&task_path, generation);
        });

        self.timers.insert(path, TimerHandle { generation, join });
    }

    /// Cancels the pending timer for `path`, if any (spec §4.1
    /// "forgetting a channel cancels its timer").
    pub fn cancel(&self, path: &Path) -> bool {
        if let Some((_, handle)) = self.timers.remove(path) {
            handle.join.abort();
            true
        } else {
            false
        }
    }

    pub fn is_scheduled(&self, path: &Path) -> bool {
        self.timers.contains_key(path)
    }

    pub fn clear(&self) {
        for entry in self.timers.iter() {
            entry.value().join.abort();
        }
        self.timers.clear();
    }

    fn is_current(&self, path: &Path, generation: u64) -> bool {
        self.timers
            .get(path)
            .map(|entry| entry.generation == generation)
            .unwrap_or(false)
    }

    fn finish_if_current(&self, path: &Path, generation: u64) {
        if self.is_current(path, generation) {
            self.timers.remove(path);
        }
    }
}
