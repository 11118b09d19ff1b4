use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;

use crate::kernel::payload::Handler;
use crate::router::path::Path;

/// The subscriber registry (C5): at most one handler per path (spec §3
/// invariant I2). Registering a second handler on the same path replaces
/// the first and logs a warning rather than erroring, matching the
/// source's "last `on` wins" behavior.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: DashMap<Path, Arc<dyn Handler>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Registers `handler` for `path`, warning if one was already present.
    pub fn on(&self, path: Path, handler: Arc<dyn Handler>) {
        if self.subscribers.contains_key(&path) {
            tracing::warn!(path = %path, "replacing existing subscriber");
        }
        self.subscribers.insert(path, handler);
    }

    pub fn get(&self, path: &Path) -> Option<Arc<dyn Handler>> {
        self.subscribers.get(path).map(|entry| entry.value().clone())
    }

    pub fn forget(&self, path: &Path) -> bool {
        self.subscribers.remove(path).is_some()
    }

    pub fn clear(&self) {
        self.subscribers.clear();
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.subscribers.contains_key(path)
    }
}

/// A handle to a live subscription, returned by `Cyre::on`/`Branch::on`,
/// allowing the caller to drop its handler without reaching back into
/// the bus by path (spec §4.3 "`on` returns an unsubscribe handle").
///
/// Holds only a [`Weak`] reference to the registry: if the owning bus has
/// already been torn down, `unsubscribe` is a harmless no-op rather than
/// keeping the whole bus alive.
pub struct Subscription {
    registry: Weak<SubscriberRegistry>,
    path: Path,
}

impl Subscription {
    pub(crate) fn new(registry: &Arc<SubscriberRegistry>, path: Path) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes this subscription's handler, provided the registration
    /// underneath has not already been replaced by a newer `on` call for
    /// the same path (in which case this is a no-op, not an error).
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.forget(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::payload::{handler_fn, HandlerResult};

    fn noop_handler() -> Arc<dyn Handler> {
        handler_fn(|payload| async move { HandlerResult::Value(payload) })
    }

    #[test]
    fn replaces_existing_subscriber() {
        let registry = SubscriberRegistry::new();
        let path = Path::parse("a").unwrap();
        registry.on(path.clone(), noop_handler());
        registry.on(path.clone(), noop_handler());
        assert!(registry.contains(&path));
    }

    #[test]
    fn subscription_unsubscribes_its_path() {
        let registry = Arc::new(SubscriberRegistry::new());
        let path = Path::parse("a").unwrap();
        registry.on(path.clone(), noop_handler());
        let sub = Subscription::new(&registry, path.clone());
        assert!(registry.contains(&path));
        sub.unsubscribe();
        assert!(!registry.contains(&path));
    }
}
