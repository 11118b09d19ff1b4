use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// The sleep future returned by [`Clock::sleep`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// An injectable source of time, so the scheduler and protection stages
/// (throttle, debounce, max-wait) can be driven deterministically in
/// tests instead of racing a real timer (spec §9 "tests must control
/// time rather than sleep on the wall clock").
pub trait Clock: Send + Sync + 'static {
    /// The current monotonic instant.
    fn now(&self) -> Instant;

    /// Milliseconds since an arbitrary fixed epoch, for storing in
    /// atomics and comparing against channel timestamps.
    fn now_ms(&self) -> u64;

    /// A future that resolves after `duration` has elapsed on this clock.
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// The production clock, backed by `tokio::time` so sleeps integrate
/// with the same runtime the scheduler's tasks run on.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_ms(&self) -> u64 {
        static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let epoch = *EPOCH.get_or_init(Instant::now);
        Instant::now().saturating_duration_since(epoch).as_millis() as u64
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// A manually-advanced virtual clock for deterministic tests of the
/// protection pipeline and scheduler, so throttle/debounce/max-wait
/// behavior can be asserted without racing real time.
#[derive(Clone)]
pub struct MockClock {
    inner: Arc<MockInner>,
}

struct MockInner {
    elapsed_ms: AtomicU64,
    sleepers: Mutex<Vec<Arc<Sleeper>>>,
}

struct Sleeper {
    deadline_ms: u64,
    waker: Mutex<Option<std::task::Waker>>,
    done: std::sync::atomic::AtomicBool,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockInner {
                elapsed_ms: AtomicU64::new(0),
                sleepers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Advances the virtual clock by `delta`, waking any sleeper whose
    /// deadline has now passed.
    pub fn advance(&self, delta: Duration) {
        let new_elapsed = self.inner.elapsed_ms.fetch_add(delta.as_millis() as u64, Ordering::AcqRel)
            + delta.as_millis() as u64;
        let mut sleepers = self.inner.sleepers.lock();
        sleepers.retain(|sleeper| {
            if new_elapsed >= sleeper.deadline_ms {
                sleeper.done.store(true, Ordering::Release);
                if let Some(waker) = sleeper.waker.lock().take() {
                    waker.wake();
                }
                false
            } else {
                true
            }
        });
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_ms(&self) -> u64 {
        self.inner.elapsed_ms.load(Ordering::Acquire)
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let deadline_ms = self.now_ms() + duration.as_millis() as u64;
        let sleeper = Arc::new(Sleeper {
            deadline_ms,
            waker: Mutex::new(None),
            done: std::sync::atomic::AtomicBool::new(false),
        });
        if self.now_ms() >= deadline_ms {
            return Box::pin(async {});
        }
        self.inner.sleepers.lock().push(sleeper.clone());
        Box::pin(MockSleepFuture { sleeper })
    }
}

struct MockSleepFuture {
    sleeper: Arc<Sleeper>,
}

impl Future for MockSleepFuture {
    type Output = ();

    fn poll(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        if self.sleeper.done.load(Ordering::Acquire) {
            return std::task::Poll::Ready(());
        }
        *self.sleeper.waker.lock() = Some(cx.waker().clone());
        if self.sleeper.done.load(Ordering::Acquire) {
            std::task::Poll::Ready(())
        } else {
            std::task::Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_clock_wakes_sleepers_on_advance() {
        let clock = MockClock::new();
        let sleep = clock.sleep(Duration::from_millis(50));
        clock.advance(Duration::from_millis(60));
        sleep.await;
        assert_eq!(clock.now_ms(), 60);
    }
}
