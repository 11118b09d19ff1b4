use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::kernel::payload::Payload;

/// What a middleware decides for a payload passing through (spec §4.4
/// "middleware" stage): continue with a possibly-rewritten payload, or
/// reject with a reason that becomes the response's rejection message.
pub enum MiddlewareOutcome {
    Continue(Payload),
    Reject(String),
}

/// A named, reusable pipeline stage a channel opts into by id (spec §6
/// `middleware: Vec<String>`), as opposed to the inline per-channel
/// `condition`/`selector`/`transform` closures.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn apply(&self, payload: Payload) -> MiddlewareOutcome;
}

/// Registers middleware by id so channels can reference it without
/// owning a copy (spec §4.4: "channels name middleware by id; the bus
/// owns the instance").
#[derive(Default)]
pub struct MiddlewareRegistry {
    middleware: DashMap<String, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self {
            middleware: DashMap::new(),
        }
    }

    pub fn register(&self, id: impl Into<String>, middleware: Arc<dyn Middleware>) {
        self.middleware.insert(id.into(), middleware);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Middleware>> {
        self.middleware.get(id).map(|entry| entry.value().clone())
    }
}
